//! 图片接口：上传、列表、单个删除与全部清空。

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Extension, Multipart, Path};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::atomic::AtomicFile;
use crate::error::ApiError;
use crate::store::{ImageRecord, ImageStore};

pub const IMAGE_FIELD: &str = "image";
pub const LINK_URL_FIELD: &str = "linkUrl";

/// 接口返回的图片：存储记录加上对外访问路径。
#[derive(Debug, Serialize)]
pub struct ImageView {
    #[serde(flatten)]
    record: ImageRecord,
    url: String,
}

impl From<ImageRecord> for ImageView {
    fn from(record: ImageRecord) -> Self {
        let url = record.public_url();
        Self { record, url }
    }
}

struct SavedUpload {
    filename: String,
    original_name: String,
    timestamp: i64,
}

/// 按存储顺序列出全部图片。
pub async fn list_images(
    Extension(store): Extension<Arc<ImageStore>>,
) -> JsonResponse<Vec<ImageView>> {
    let views = store
        .read_all()
        .await
        .into_iter()
        .map(ImageView::from)
        .collect::<Vec<_>>();
    debug!(count = views.len(), "list images");
    JsonResponse(views)
}

/// 接收 multipart 上传，写入文件并追加元数据记录。
///
/// 请求体不是 multipart 时与缺少文件同样处理。
pub async fn upload_image(
    Extension(store): Extension<Arc<ImageStore>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, JsonResponse<ImageView>), ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "upload without multipart body");
        ApiError::BadRequest("No file uploaded".into())
    })?;
    let mut saved: Option<SavedUpload> = None;
    let mut link_url: Option<String> = None;

    let read_result: Result<(), ApiError> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some(IMAGE_FIELD) if saved.is_none() => {
                    let Some(original_name) = field.file_name().map(str::to_string) else {
                        continue;
                    };
                    saved = Some(save_upload(&store, original_name, field).await?);
                }
                Some(LINK_URL_FIELD) => {
                    let value = field
                        .text()
                        .await
                        .map_err(|err| ApiError::Internal(err.to_string()))?;
                    link_url = Some(value);
                }
                _ => {}
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = read_result {
        if let Some(saved) = &saved {
            store.remove_upload(&saved.filename).await;
        }
        return Err(err);
    }
    let Some(saved) = saved else {
        return Err(ApiError::BadRequest("No file uploaded".into()));
    };

    let record = ImageRecord {
        filename: saved.filename,
        original_name: saved.original_name,
        link_url: link_url.unwrap_or_default(),
        timestamp: saved.timestamp,
    };

    {
        let _guard = store.lock().await;
        let mut records = store.read_all().await;
        records.push(record.clone());
        if let Err(err) = store.write_all(&records).await {
            store.remove_upload(&record.filename).await;
            return Err(err.into());
        }
    }

    info!(
        filename = record.filename,
        original_name = record.original_name,
        "image uploaded"
    );
    Ok((StatusCode::CREATED, JsonResponse(ImageView::from(record))))
}

/// 按文件名删除单张图片；文件删除失败不影响记录移除。
pub async fn delete_image(
    Path(filename): Path<String>,
    Extension(store): Extension<Arc<ImageStore>>,
) -> Result<JsonResponse<Value>, ApiError> {
    let _guard = store.lock().await;
    let mut records = store.read_all().await;
    let Some(index) = records.iter().position(|record| record.filename == filename) else {
        return Err(ApiError::NotFound("Image not found".into()));
    };

    store.remove_upload(&filename).await;
    records.remove(index);
    store.write_all(&records).await?;

    info!(filename, remaining = records.len(), "image deleted");
    Ok(JsonResponse(json!({ "ok": true })))
}

/// 清空上传目录并写回空列表。
pub async fn delete_all_images(
    Extension(store): Extension<Arc<ImageStore>>,
) -> Result<JsonResponse<Value>, ApiError> {
    let _guard = store.lock().await;
    let removed = store.clear_uploads().await;
    store.write_all(&[]).await?;

    info!(removed, "all images deleted");
    Ok(JsonResponse(json!({ "ok": true })))
}

/// 把上传字段流式写入暂存目录，完成后移入上传目录，中途失败时丢弃临时文件。
async fn save_upload(
    store: &ImageStore,
    original_name: String,
    mut field: Field<'_>,
) -> Result<SavedUpload, ApiError> {
    let timestamp = Utc::now().timestamp_millis();
    let filename = generate_filename(&original_name, timestamp);
    let target = store
        .upload_path(&filename)
        .map_err(|_| ApiError::Internal(format!("generated name rejected: {filename}")))?;
    store
        .ensure_dirs()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let mut atomic = AtomicFile::new_in(store.staging_dir(), &target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let write_result: Result<u64, ApiError> = async {
        let mut total_written: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?
        {
            total_written += chunk.len() as u64;
            atomic
                .write_all(&chunk)
                .await
                .map_err(|err| ApiError::Internal(err.to_string()))?;
        }
        Ok(total_written)
    }
    .await;
    let size = match write_result {
        Ok(value) => value,
        Err(err) => {
            atomic.cleanup().await;
            return Err(err);
        }
    };
    atomic
        .finalize()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    debug!(filename, size, "upload written");
    Ok(SavedUpload {
        filename,
        original_name,
        timestamp,
    })
}

/// 生成 `<净化后的主名>_<毫秒时间戳><扩展名>`。
pub fn generate_filename(original_name: &str, timestamp: i64) -> String {
    let name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let (base, ext) = match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], &name[index + 1..]),
        _ => (name, ""),
    };

    let mut filename = format!("{}_{timestamp}", sanitize(base));
    if name.len() > base.len() {
        filename.push('.');
        filename.push_str(&sanitize(ext));
    }
    filename
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;
    use axum::extract::FromRequest;
    use axum::http::{Request, header};
    use tempfile::tempdir;

    const BOUNDARY: &str = "imgshelf-test-boundary";

    fn make_store() -> (tempfile::TempDir, Arc<ImageStore>) {
        let temp = tempdir().expect("tempdir");
        let store = ImageStore::new(
            temp.path().join("data").join("images.json"),
            temp.path().join("uploads"),
        );
        (temp, Arc::new(store))
    }

    /// 构造 multipart 请求体；`filename` 为 `Some` 时表示文件字段。
    async fn multipart(
        parts: &[(&str, Option<&str>, &str)],
    ) -> Result<Multipart, MultipartRejection> {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(file) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(AxumBody::from(body))
            .expect("request");
        Multipart::from_request(request, &()).await
    }

    async fn upload(store: &Arc<ImageStore>, name: &str, link: Option<&str>) -> ImageView {
        let mut parts = vec![(IMAGE_FIELD, Some(name), "fake image bytes")];
        if let Some(link) = link {
            parts.push((LINK_URL_FIELD, None, link));
        }
        let (status, JsonResponse(view)) =
            upload_image(Extension(store.clone()), multipart(&parts).await)
                .await
                .expect("upload");
        assert_eq!(status, StatusCode::CREATED);
        view
    }

    #[test]
    fn generated_names_are_sanitized_and_stamped() {
        assert_eq!(generate_filename("cat.png", 42), "cat_42.png");
        assert_eq!(generate_filename("my photo (1).JPG", 7), "my_photo__1__7.JPG");
        assert_eq!(generate_filename("archive.tar.gz", 1), "archive_tar_1.gz");
        assert_eq!(generate_filename("noext", 5), "noext_5");
        assert_eq!(generate_filename(".bashrc", 5), "_bashrc_5");
        assert_eq!(generate_filename("dir/evil.png", 9), "evil_9.png");
        assert_eq!(generate_filename("ภาพ.png", 3), "____3.png");
        assert_eq!(generate_filename("weird.p g", 3), "weird_3.p_g");
    }

    #[tokio::test]
    async fn upload_then_list_returns_record_with_url() {
        let (temp, store) = make_store();
        let view = upload(&store, "cat.png", Some("http://example.com")).await;

        assert_eq!(view.record.original_name, "cat.png");
        assert_eq!(view.record.link_url, "http://example.com");
        assert!(view.record.filename.starts_with("cat_"));
        assert!(view.record.filename.ends_with(".png"));
        assert_eq!(view.url, format!("/uploads/{}", view.record.filename));

        let stored = std::fs::read(temp.path().join("uploads").join(&view.record.filename))
            .expect("uploaded file");
        assert_eq!(stored, b"fake image bytes");

        let JsonResponse(listed) = list_images(Extension(store)).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record, view.record);
        assert!(listed[0].url.starts_with("/uploads/"));
    }

    #[tokio::test]
    async fn list_serializes_flat_camel_case_objects() {
        let (_temp, store) = make_store();
        upload(&store, "dog.jpg", None).await;

        let JsonResponse(listed) = list_images(Extension(store)).await;
        let value = serde_json::to_value(&listed).expect("serialize");
        let item = &value[0];
        for key in ["filename", "originalName", "linkUrl", "timestamp", "url"] {
            assert!(item.get(key).is_some(), "missing {key}");
        }
        assert_eq!(item["linkUrl"], "");
    }

    #[tokio::test]
    async fn link_url_may_precede_the_file() {
        let (_temp, store) = make_store();
        let parts = [
            (LINK_URL_FIELD, None, "https://example.org/a"),
            (IMAGE_FIELD, Some("a.gif"), "GIF89a"),
        ];
        let (_, JsonResponse(view)) = upload_image(Extension(store.clone()), multipart(&parts).await)
            .await
            .expect("upload");
        assert_eq!(view.record.link_url, "https://example.org/a");
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected_and_store_untouched() {
        let (temp, store) = make_store();
        let parts = [(LINK_URL_FIELD, None, "http://example.com")];
        let result = upload_image(Extension(store.clone()), multipart(&parts).await).await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(!temp.path().join("data").join("images.json").exists());
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn non_multipart_body_is_rejected_as_missing_file() {
        let (_temp, store) = make_store();
        let request = Request::builder()
            .method("POST")
            .uri("/api/images")
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from("{}"))
            .expect("request");
        let extracted = Multipart::from_request(request, &()).await;
        assert!(extracted.is_err());

        let result = upload_image(Extension(store.clone()), extracted).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn image_field_without_filename_counts_as_missing() {
        let (_temp, store) = make_store();
        let parts = [(IMAGE_FIELD, None, "not a file")];
        let result = upload_image(Extension(store), multipart(&parts).await).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn delete_unknown_returns_not_found_and_keeps_store() {
        let (_temp, store) = make_store();
        upload(&store, "cat.png", None).await;
        let before = store.read_all().await;

        let result = delete_image(Path("missing_1.png".to_string()), Extension(store.clone())).await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(store.read_all().await, before);
    }

    #[tokio::test]
    async fn delete_removes_exactly_one_record_and_its_file() {
        let (temp, store) = make_store();
        let first = upload(&store, "first.png", None).await;
        let second = upload(&store, "second.png", None).await;

        let JsonResponse(body) = delete_image(
            Path(first.record.filename.clone()),
            Extension(store.clone()),
        )
        .await
        .expect("delete");

        assert_eq!(body, json!({ "ok": true }));
        assert_eq!(store.read_all().await, vec![second.record]);
        assert!(!temp.path().join("uploads").join(&first.record.filename).exists());
    }

    #[tokio::test]
    async fn delete_succeeds_when_file_already_gone() {
        let (temp, store) = make_store();
        let view = upload(&store, "cat.png", None).await;
        std::fs::remove_file(temp.path().join("uploads").join(&view.record.filename))
            .expect("remove file");

        delete_image(Path(view.record.filename), Extension(store.clone()))
            .await
            .expect("delete");
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn delete_all_wipes_store_and_uploads() {
        let (temp, store) = make_store();
        upload(&store, "a.png", None).await;
        upload(&store, "b.png", None).await;
        std::fs::write(temp.path().join("uploads").join("orphan.bin"), b"x").expect("orphan");

        let JsonResponse(body) = delete_all_images(Extension(store.clone()))
            .await
            .expect("delete all");

        assert_eq!(body, json!({ "ok": true }));
        assert!(store.read_all().await.is_empty());
        let remaining = std::fs::read_dir(temp.path().join("uploads"))
            .expect("read dir")
            .count();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn concurrent_uploads_are_all_recorded() {
        let (_temp, store) = make_store();
        let tasks = (0..8).map(|index| {
            let store = store.clone();
            async move {
                let name = format!("img{index}.png");
                upload(&store, &name, None).await
            }
        });
        futures_util::future::join_all(tasks).await;

        let records = store.read_all().await;
        assert_eq!(records.len(), 8);
    }
}
