use super::*;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

fn create_storage(server: &MockServer) -> FirebaseStorage {
    let client = ClientBuilder::new(Client::new()).build();
    let root = StorageLocation::new("test-bucket", None).unwrap();
    FirebaseStorage::new_with_client(client, server.url(""), root)
}

#[test]
fn test_references_navigate_locally() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    let root = storage.reference();
    assert_eq!(root.bucket(), "test-bucket");
    assert_eq!(root.full_path(), "");
    assert_eq!(root.name(), "");
    assert!(root.parent().is_none());

    let photo = storage.reference_with_path("/users/42/").child("photo.png");
    assert_eq!(photo.full_path(), "users/42/photo.png");
    assert_eq!(photo.name(), "photo.png");
    assert_eq!(photo.parent().unwrap().full_path(), "users/42");
    assert_eq!(photo.root().full_path(), "");
}

#[test]
fn test_reference_from_url() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    let from_gs = storage.reference_from_url("gs://test-bucket/a/b.txt").unwrap();
    assert_eq!(from_gs.bucket(), "test-bucket");
    assert_eq!(from_gs.full_path(), "a/b.txt");

    let from_https = storage
        .reference_from_url("https://firebasestorage.googleapis.com/v0/b/test-bucket/o/a%2Fb.txt")
        .unwrap();
    assert_eq!(from_https.bucket(), "test-bucket");
    assert_eq!(from_https.full_path(), from_gs.full_path());

    let err = storage.reference_from_url("ftp://x").unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedUrl(_)));
}

#[test]
fn test_reference_from_url_rejects_other_buckets() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    for url in [
        "gs://someone-else/secret.txt",
        "https://firebasestorage.googleapis.com/v0/b/someone-else/o/secret.txt",
        "https://storage.googleapis.com/someone-else/secret.txt",
    ] {
        assert!(
            matches!(storage.reference_from_url(url), Err(StorageError::InvalidArgument(_))),
            "{url} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_put_bytes() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("test-file.txt");

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/storage/v1/b/test-bucket/o")
            .query_param("uploadType", "media")
            .query_param("name", "test-file.txt")
            .header("content-type", "text/plain")
            .body("Hello, World!");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "test-file.txt",
                "bucket": "test-bucket",
                "size": "13"
            }));
    });

    let metadata = file
        .put_bytes_with_content_type("Hello, World!", "text/plain")
        .await
        .unwrap();
    assert_eq!(metadata.size_bytes(), Some(13));

    mock.assert();
}

#[tokio::test]
async fn test_get_bytes() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("test-file.txt");

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v1/b/test-bucket/o/test-file.txt")
            .query_param("alt", "media");
        then.status(200).body("Hello, World!");
    });

    let bytes = file.get_bytes(1024).await.unwrap();
    assert_eq!(bytes, "Hello, World!".as_bytes());

    mock.assert();
}

#[tokio::test]
async fn test_get_bytes_rejects_oversized_objects() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("big.bin");

    let _mock = server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v1/b/test-bucket/o/big.bin")
            .query_param("alt", "media");
        then.status(200).body("0123456789abcdefghij");
    });

    let err = file.get_bytes(10).await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectTooLarge { max_size: 10 }));
}

#[tokio::test]
async fn test_get_bytes_limits_streamed_objects() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Chunked body without Content-Length, so only the streaming check can trip.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await.unwrap();
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Transfer-Encoding: chunked\r\n\
                  Connection: close\r\n\r\n\
                  8\r\n01234567\r\n\
                  7\r\n89abcde\r\n\
                  0\r\n\r\n",
            )
            .await
            .unwrap();
        let _ = socket.shutdown().await;
    });

    let client = ClientBuilder::new(Client::new()).build();
    let root = StorageLocation::new("test-bucket", None).unwrap();
    let storage = FirebaseStorage::new_with_client(client, format!("http://{addr}"), root);

    let err = storage
        .reference_with_path("stream.bin")
        .get_bytes(10)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ObjectTooLarge { max_size: 10 }));

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_get_download_url_with_token() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("photo.png");

    let mock = server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/test-bucket/o/photo.png");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "photo.png",
                "bucket": "test-bucket",
                "metadata": {
                    "firebaseStorageDownloadTokens": "token-1,token-2"
                }
            }));
    });

    let url = file.get_download_url().await.unwrap();
    assert_eq!(
        url,
        "https://firebasestorage.googleapis.com/v0/b/test-bucket/o/photo.png?alt=media&token=token-1"
    );

    mock.assert();
}

#[tokio::test]
async fn test_get_download_url_without_token() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("photo.png");

    let _mock = server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/test-bucket/o/photo.png");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "name": "photo.png", "bucket": "test-bucket" }));
    });

    let url = file.get_download_url().await.unwrap();
    assert_eq!(url, "https://storage.googleapis.com/test-bucket/photo.png");
}

#[tokio::test]
async fn test_delete() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("test-file.txt");

    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path("/storage/v1/b/test-bucket/o/test-file.txt");
        then.status(204);
    });

    file.delete().await.unwrap();

    mock.assert();
}

#[tokio::test]
async fn test_missing_object_maps_to_not_found() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("gone.txt");

    let _mock = server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/test-bucket/o/gone.txt");
        then.status(404)
            .header("content-type", "application/json")
            .json_body(json!({ "error": { "code": 404, "message": "No such object" } }));
    });

    let err = file.get_metadata().await.unwrap_err();
    match err {
        StorageError::ObjectNotFound(location) => assert_eq!(location, "gs://test-bucket/gone.txt"),
        other => panic!("expected ObjectNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_errors_carry_server_message() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let file = storage.reference_with_path("locked.txt");

    let _mock = server.mock(|when, then| {
        when.method(DELETE).path("/storage/v1/b/test-bucket/o/locked.txt");
        then.status(403)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": { "code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED" }
            }));
    });

    let err = file.delete().await.unwrap_err();
    match err {
        StorageError::ApiError(message) => {
            assert!(message.starts_with("Delete failed"));
            assert!(message.contains("Permission denied"));
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_root_reference_rejects_object_operations() {
    let server = MockServer::start();
    let storage = create_storage(&server);
    let root = storage.reference();

    assert!(matches!(
        root.delete().await,
        Err(StorageError::InvalidRootOperation("delete"))
    ));
    assert!(matches!(
        root.get_bytes(10).await,
        Err(StorageError::InvalidRootOperation("get_bytes"))
    ));
    assert!(matches!(
        root.put_bytes(vec![1, 2, 3]).await,
        Err(StorageError::InvalidRootOperation("put_bytes"))
    ));
}

#[test]
fn test_use_emulator_rejects_blank_host() {
    let server = MockServer::start();
    let mut storage = create_storage(&server);

    assert!(matches!(
        storage.use_emulator("  ", 9199),
        Err(StorageError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_emulator_download_url_uses_emulator_origin() {
    let server = MockServer::start();
    let mut storage = create_storage(&server);
    storage
        .use_emulator(&server.host(), server.port())
        .unwrap();
    let file = storage.reference_with_path("photo.png");

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v1/b/test-bucket/o/photo.png")
            .header("authorization", "Bearer owner");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "photo.png",
                "metadata": { "firebaseStorageDownloadTokens": "emu-token" }
            }));
    });

    let url = file.get_download_url().await.unwrap();
    assert_eq!(
        url,
        format!(
            "http://{}:{}/v0/b/test-bucket/o/photo.png?alt=media&token=emu-token",
            server.host(),
            server.port()
        )
    );

    mock.assert();
}
