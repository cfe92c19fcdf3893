//! 页面与静态资源：首页、管理页、robots.txt 以及公共目录回退。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tower_http::services::ServeDir;

use crate::error::ApiError;

pub const HOME_PAGE: &str = "index.html";
pub const ADMIN_PAGE: &str = "admin31.html";
pub const ROBOTS_FILE: &str = "robots.txt";

/// 页面与静态文件所在的目录。
#[derive(Clone, Debug)]
pub struct SiteConfig {
    public_dir: PathBuf,
    uploads_dir: PathBuf,
}

impl SiteConfig {
    pub fn new(public_dir: PathBuf, uploads_dir: PathBuf) -> Self {
        Self {
            public_dir,
            uploads_dir,
        }
    }

    /// `/uploads/*` 使用的静态服务。
    pub fn uploads_service(&self) -> ServeDir {
        ServeDir::new(&self.uploads_dir)
    }

    /// 其余路径回退到公共目录。
    pub fn public_service(&self) -> ServeDir {
        ServeDir::new(&self.public_dir)
    }
}

/// 首页。
pub async fn home_page(Extension(site): Extension<Arc<SiteConfig>>) -> Result<Response, ApiError> {
    serve_page(&site.public_dir.join(HOME_PAGE), None).await
}

/// 管理页面：无鉴权，仅依赖路径不公开。
pub async fn admin_page(
    Extension(site): Extension<Arc<SiteConfig>>,
) -> Result<Response, ApiError> {
    serve_page(&site.public_dir.join(ADMIN_PAGE), None).await
}

/// robots.txt，显式声明纯文本类型。
pub async fn robots_txt(Extension(site): Extension<Arc<SiteConfig>>) -> Result<Response, ApiError> {
    serve_page(
        &site.public_dir.join(ROBOTS_FILE),
        Some("text/plain; charset=utf-8"),
    )
    .await
}

/// 读取页面文件；未指定类型时按扩展名推断。
async fn serve_page(path: &Path, content_type: Option<&'static str>) -> Result<Response, ApiError> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound("not found".into()));
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    };

    let content_type = match content_type {
        Some(value) => HeaderValue::from_static(value),
        None => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            HeaderValue::from_str(mime.essence_str())
                .map_err(|_| ApiError::Internal("invalid mime type".into()))?
        }
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    Ok((headers, AxumBody::from(data)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tempfile::tempdir;

    fn make_site() -> (tempfile::TempDir, Arc<SiteConfig>) {
        let temp = tempdir().expect("tempdir");
        let public = temp.path().join("public");
        std::fs::create_dir_all(&public).expect("create public");
        std::fs::write(public.join(HOME_PAGE), "<h1>home</h1>").expect("write home");
        std::fs::write(public.join(ROBOTS_FILE), "User-agent: *\nAllow: /\n").expect("write robots");
        let site = SiteConfig::new(public.clone(), public.join("uploads"));
        (temp, Arc::new(site))
    }

    #[tokio::test]
    async fn home_page_is_html() {
        let (_temp, site) = make_site();
        let response = home_page(Extension(site)).await.expect("home page");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        let body = response.into_body().collect().await.expect("body").to_bytes();
        assert_eq!(&body[..], b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn robots_txt_is_plain_text() {
        let (_temp, site) = make_site();
        let response = robots_txt(Extension(site)).await.expect("robots");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn missing_admin_page_is_not_found() {
        let (_temp, site) = make_site();
        let result = admin_page(Extension(site)).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
