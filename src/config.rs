//! 命令行参数与服务器默认配置。

use clap::Parser;
use std::path::PathBuf;

use crate::pages::SiteConfig;
use crate::store::ImageStore;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_UPLOADS_DIR: &str = "public/uploads";
pub const DEFAULT_STORE_PATH: &str = "data/images.json";
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// 服务端命令行参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "imgshelf", version, about = "Minimal image hosting server")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "IMGSHELF_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "IMGSHELF_PUBLIC_DIR",
        default_value = DEFAULT_PUBLIC_DIR,
        help = "Directory holding index.html, admin31.html, robots.txt and other static files"
    )]
    pub public_dir: PathBuf,
    #[arg(
        long,
        env = "IMGSHELF_UPLOADS_DIR",
        default_value = DEFAULT_UPLOADS_DIR,
        help = "Directory for uploaded images, served under /uploads"
    )]
    pub uploads_dir: PathBuf,
    #[arg(
        long,
        env = "IMGSHELF_STORE_PATH",
        default_value = DEFAULT_STORE_PATH,
        help = "JSON file holding image metadata"
    )]
    pub store_path: PathBuf,
}

impl Args {
    /// 由参数构建元数据存储。
    pub fn image_store(&self) -> ImageStore {
        ImageStore::new(self.store_path.clone(), self.uploads_dir.clone())
    }

    /// 由参数构建页面与静态资源配置。
    pub fn site_config(&self) -> SiteConfig {
        SiteConfig::new(self.public_dir.clone(), self.uploads_dir.clone())
    }
}
