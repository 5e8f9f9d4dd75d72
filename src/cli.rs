use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Block-based filesystem images, served through FUSE")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create (or overwrite) an image file and format it
    Mkfs {
        image: PathBuf,

        /// Image size in 1024-byte blocks
        #[arg(long, short, default_value_t = 1024)]
        blocks: u64,
    },

    /// Print the layout and usage of an image
    Info { image: PathBuf },

    /// Serve an image at a mountpoint until it is unmounted
    Mount {
        image: PathBuf,
        mountpoint: PathBuf,

        #[arg(long)]
        read_only: bool,

        /// Let users other than the mounting one access the filesystem
        #[arg(long)]
        allow_other: bool,

        #[arg(long)]
        auto_unmount: bool,
    },
}
