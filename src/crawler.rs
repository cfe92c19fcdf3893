//! 搜索引擎爬虫识别：基于 User-Agent 子串匹配。

use axum::body::Body as AxumBody;
use axum::http::{Request, header};
use axum::{middleware, response::Response};
use tracing::debug;

/// Google 爬虫的 User-Agent 特征子串，区分大小写，三种 Googlebot 写法逐一列出。
pub const GOOGLE_CRAWLER_PATTERNS: &[&str] = &[
    "Googlebot",
    "GoogleBot",
    "googlebot",
    "Mediapartners-Google",
    "AdsBot-Google",
    "Google-AdsBot",
    "Googlebot-Image",
    "Googlebot-Video",
];

/// [`detect_crawler`] 为每个请求写入的扩展标记。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrawlerFlag(pub bool);

/// 判断 User-Agent 是否属于 Google 爬虫。
pub fn is_google_crawler(user_agent: &str) -> bool {
    GOOGLE_CRAWLER_PATTERNS
        .iter()
        .any(|pattern| user_agent.contains(pattern))
}

/// 爬虫识别中间件：只写入请求扩展，不改变响应。
///
/// 缺失或无法按文本解析的 User-Agent 视为空串；重复出现时取第一个。
pub async fn detect_crawler(mut req: Request<AxumBody>, next: middleware::Next) -> Response {
    let is_crawler = {
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        let is_crawler = is_google_crawler(user_agent);
        if is_crawler {
            debug!(path = req.uri().path(), user_agent, "crawler request");
        }
        is_crawler
    };
    req.extensions_mut().insert(CrawlerFlag(is_crawler));
    next.run(req).await
}
