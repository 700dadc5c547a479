//! Formats a new TFS image file.

use std::path::PathBuf;
use std::process::exit;

use tfs::layout::Layout;
use tfs::layout::DEFAULT_MAX_BLOCKS;
use tfs::layout::DEFAULT_MAX_INODES;
use tfs::Fs;

fn print_usage() {
    eprintln!("Usage: mkfs [-i inodes] [-b blocks] <image-path>");
    eprintln!();
    eprintln!("Formats <image-path> as a new TFS image, prompting for confirmation if it");
    eprintln!("already exists.");
}

struct Args {
    image: PathBuf,
    max_inodes: u32,
    max_blocks: u32,
}

fn parse_args() -> Option<Args> {
    let mut max_inodes = DEFAULT_MAX_INODES;
    let mut max_blocks = DEFAULT_MAX_BLOCKS;
    let mut image = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-i" => max_inodes = args.next()?.parse().ok()?,
            "-b" => max_blocks = args.next()?.parse().ok()?,
            "-h" | "--help" => return None,
            other => {
                if image.is_some() {
                    return None;
                }
                image = Some(PathBuf::from(other));
            }
        }
    }

    Some(Args {
        image: image?,
        max_inodes,
        max_blocks,
    })
}

fn prompt_overwrite(path: &std::path::Path) -> bool {
    eprint!("{} already exists; overwrite? [y/N] ", path.display());
    use std::io::Write;
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

fn main() {
    env_logger::init();

    let args = match parse_args() {
        Some(a) => a,
        None => {
            print_usage();
            exit(2);
        }
    };

    if args.image.exists() && !prompt_overwrite(&args.image) {
        eprintln!("aborted");
        exit(1);
    }

    let layout = match Layout::new(args.max_inodes, args.max_blocks) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("mkfs: invalid layout: {e}");
            exit(1);
        }
    };

    match Fs::format(&args.image, layout) {
        Ok(_) => {
            println!(
                "formatted {} ({} inodes, {} data blocks, {} bytes)",
                args.image.display(),
                layout.max_inodes,
                layout.max_blocks,
                layout.total_bytes()
            );
        }
        Err(e) => {
            eprintln!("mkfs: {e}");
            exit(1);
        }
    }
}
