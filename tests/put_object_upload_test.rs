//! PutObject Upload Integration Tests
//!
//! ## Test Coverage
//!
//! - Small files go out as one PUT with the whole body and Content-Length
//! - Store errors surface as structured `PutObjectFailed`
//! - Large uncompressed files are gzipped first; md5 stays the original's
//! - Already-compressed files are never recompressed
//! - Inspection failures (missing file, empty file)

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use ferry_uploadr::upload::{RemoteError, Strategy, UploadError, UploadResult};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    // ========================================================================
    // TEST: Single Request Upload
    // ========================================================================

    #[tokio::test]
    async fn test_small_file_single_put_with_content_length() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();
        let data = random_bytes(2000);
        let file = write_file(dir.path(), "small.bin", &data);

        Mock::given(method("PUT"))
            .and(path(TestEnv::object_path("small.bin")))
            .and(query_param("X-Amz-Action", "PutObject"))
            .and(header("content-length", "2000"))
            .and(header("x-amz-signed-action", "PutObject"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&env.store)
            .await;

        let outcome = env
            .uploader(test_upload_config())
            .upload(&file, 10, 20)
            .await
            .unwrap();

        assert_eq!(outcome.strategy, Strategy::Single);
        assert_eq!(outcome.file_meta.md5, md5_hex(&data));
        assert!(!outcome.file_meta.is_compressed);
        match &outcome.result {
            UploadResult::PutObject(result) => {
                assert_eq!(result.etag.as_deref(), Some("abc123"));
                assert_eq!(result.bytes_written, 2000);
            }
            other => panic!("expected PutObject result, got {:?}", other),
        }

        let puts = env.store_requests("PutObject").await;
        assert_eq!(puts[0].body, data);

        let signed = env.sign_requests("PutObject").await;
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0]["basename"], "small.bin");
        assert_eq!(signed[0]["appId"], 10);
        assert!(signed[0].get("uploadId").is_none());
        assert!(env.sign_requests("CreateMultipartUpload").await.is_empty());
    }

    #[tokio::test]
    async fn test_put_error_envelope_is_structured() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "small.bin", &random_bytes(100));

        Mock::given(method("PUT"))
            .and(query_param("X-Amz-Action", "PutObject"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(error_xml("SignatureDoesNotMatch", "Bad signature")),
            )
            .mount(&env.store)
            .await;

        let err = env
            .uploader(test_upload_config())
            .upload(&file, 1, 1)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "put_object_failed");
        assert_eq!(
            err.remote(),
            Some(&RemoteError::Service {
                status: 403,
                code: "SignatureDoesNotMatch".into(),
                message: "Bad signature".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_put_non_200_success_status_is_failure() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "small.bin", &random_bytes(100));

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&env.store)
            .await;

        let err = env
            .uploader(test_upload_config())
            .upload(&file, 1, 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::PutObjectFailed(RemoteError::Raw { status: 204, .. })
        ));
    }

    // ========================================================================
    // TEST: Compression
    // ========================================================================

    #[tokio::test]
    async fn test_large_text_file_is_gzipped_before_upload() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();
        let data = "ferry uploadr compressible line\n".repeat(200).into_bytes();
        let file = write_file(dir.path(), "app.log", &data);

        Mock::given(method("PUT"))
            .and(path(TestEnv::object_path("app.log.gz")))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"gz\""))
            .expect(1)
            .mount(&env.store)
            .await;

        let mut config = test_upload_config();
        config.compress_threshold = 1024;

        let outcome = env.uploader(config).upload(&file, 1, 1).await.unwrap();

        assert!(outcome.file_meta.is_compressed);
        assert_eq!(outcome.file_meta.basename, "app.log.gz");
        assert!(outcome.file_meta.file_size < data.len() as u64);
        // Checksum describes the original content
        assert_eq!(outcome.file_meta.md5, md5_hex(&data));
        // The temporary copy is gone once the upload returns
        assert!(!outcome.file_meta.file_name.exists());

        let puts = env.store_requests("PutObject").await;
        let mut decoded = Vec::new();
        GzDecoder::new(puts[0].body.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data);

        let signed = env.sign_requests("PutObject").await;
        assert_eq!(signed[0]["basename"], "app.log.gz");
    }

    #[tokio::test]
    async fn test_gzip_input_is_not_recompressed() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut data = vec![0x1f, 0x8b, 0x08];
        data.extend(random_bytes(3000));
        let file = write_file(dir.path(), "bundle.gz", &data);

        Mock::given(method("PUT"))
            .and(path(TestEnv::object_path("bundle.gz")))
            .and(header("content-length", "3003"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&env.store)
            .await;

        let mut config = test_upload_config();
        config.compress_threshold = 1024;

        let outcome = env.uploader(config).upload(&file, 1, 1).await.unwrap();

        assert!(outcome.file_meta.is_compressed);
        assert_eq!(outcome.file_meta.basename, "bundle.gz");
        assert_eq!(outcome.file_meta.file_name, file);
        assert_eq!(outcome.result.etag(), None);
    }

    // ========================================================================
    // TEST: Inspection Failures
    // ========================================================================

    #[tokio::test]
    async fn test_missing_file_is_file_not_readable() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = env
            .uploader(test_upload_config())
            .upload(dir.path().join("absent.bin"), 1, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::FileNotReadable { .. }));
        assert!(env.signer.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_is_invalid_size() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "empty.bin", &[]);

        let err = env
            .uploader(test_upload_config())
            .upload(&file, 1, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::InvalidFileSize(0)));
        assert!(env.signer.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_rejected_even_when_everything_compresses() {
        let env = TestEnv::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "empty.sql", &[]);

        let mut config = test_upload_config();
        config.compress_threshold = 0;

        let err = env.uploader(config).upload(&file, 1, 1).await.unwrap_err();

        assert!(matches!(err, UploadError::InvalidFileSize(0)));
        assert!(env.signer.received_requests().await.unwrap().is_empty());
        assert!(env.store.received_requests().await.unwrap().is_empty());
    }
}
