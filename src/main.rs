mod cli;

use clap::Parser;
use log::info;

use blockfs::driver::file_drive::FileDrive;
use blockfs::fuse::filesystem::{mount, MountOptions};
use blockfs::ops::meta::now;
use blockfs::ops::BlockFS;
use blockfs::util::error::Result;
use blockfs::util::format::pretty_size_from_blocks;
use cli::{Cli, Command};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Mkfs { image, blocks } => {
            let fs = BlockFS::format(FileDrive::create(&image, blocks)?, now())?;
            info!("created {}", image.display());
            print_info(&fs);
        }
        Command::Info { image } => {
            let fs = BlockFS::mount(FileDrive::open(&image, false)?)?;
            print_info(&fs);
        }
        Command::Mount { image, mountpoint, read_only, allow_other, auto_unmount } => {
            let fs = BlockFS::mount(FileDrive::open(&image, !read_only)?)?;
            let options = MountOptions { read_only, allow_other, auto_unmount };
            mount(fs, &mountpoint, &options)?;
        }
    }
    Ok(())
}

fn print_info(fs: &BlockFS<FileDrive>) {
    let superblock = fs.superblock();
    let statistics = fs.statfs();

    println!("Superblock: {:?}", superblock);
    println!(
        "Layout: inode map @{}, block map @{}, inode table @{}, data @{}",
        superblock.inode_map_start(),
        superblock.block_map_start(),
        superblock.inode_table_start(),
        superblock.data_start()
    );
    println!(
        "Blocks: {} total ({}), {} free ({})",
        statistics.total_blocks,
        pretty_size_from_blocks(statistics.total_blocks),
        statistics.free_blocks,
        pretty_size_from_blocks(statistics.free_blocks)
    );
    println!("Inodes: {} total, {} free", statistics.total_inodes, statistics.free_inodes);
}
