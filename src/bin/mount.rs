//! Mounts a TFS image at a directory via FUSE.

use std::path::PathBuf;
use std::process::exit;

use fuser::MountOption;
use tfs::adapter::TfsAdapter;
use tfs::Fs;

fn print_usage() {
    eprintln!("Usage: mount <image-path> <mount-point>");
    eprintln!();
    eprintln!("Mounts <image-path> at <mount-point>, formatting it first if it does not");
    eprintln!("already exist.");
}

fn main() {
    env_logger::init();

    let owned: Vec<String> = std::env::args().collect();
    let args: Vec<&str> = owned.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] => unreachable!("argv always has at least the program name"),
        [_] | [_, "-h"] | [_, "--help"] => {
            print_usage();
            exit(2);
        }
        [_, image, mount_point] => {
            let image = PathBuf::from(*image);
            let fs = match Fs::init(&image) {
                Ok(fs) => fs,
                Err(e) => {
                    eprintln!("mount: {e}");
                    exit(1);
                }
            };

            let options = vec![MountOption::FSName("tfs".to_string()), MountOption::AutoUnmount];
            log::info!("mounting {} at {}", image.display(), mount_point);
            if let Err(e) = fuser::mount2(TfsAdapter::new(fs), mount_point, &options) {
                eprintln!("mount: {e}");
                exit(1);
            }
        }
        _ => {
            print_usage();
            exit(2);
        }
    }
}
