use bytes::Bytes;
use http::StatusCode;
use pwakit_cache::{CacheEntry, CacheStorage, MemoryBackend, SqliteBackend, StoredRequest};
use pwakit_net::{Request, Response, ResponseType, Url};

fn url(path: &str) -> Url {
    Url::parse("https://shop.test/").unwrap().join(path).unwrap()
}

async fn exercise(storage: CacheStorage) {
    let shell = storage.open("ftc-pwa-v1.0.0").await.unwrap();
    let data = storage.open("ftc-pwa-v1.0.0-data").await.unwrap();

    let page = Request::get(url("/products"));
    let response = Response::new(page.url.clone(), StatusCode::OK, "catalog");
    shell.put(&page, &response).await.unwrap();

    let order = Request::post(url("/orders/submit/42"), Bytes::from_static(b"{\"qty\":1}"));
    data.put_entry(CacheEntry::new(StoredRequest::from(&order), None))
        .await
        .unwrap();

    assert_eq!(
        storage.keys().await.unwrap(),
        vec!["ftc-pwa-v1.0.0", "ftc-pwa-v1.0.0-data"]
    );

    let hit = shell.match_request(&page).await.unwrap().unwrap();
    assert_eq!(hit.text().unwrap(), "catalog");
    assert_eq!(hit.response_type, ResponseType::Basic);

    let queued = data.keys().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].method, "POST");
    assert_eq!(queued[0].body.as_deref(), Some(&b"{\"qty\":1}"[..]));

    assert!(data.delete(&queued[0].key()).await.unwrap());
    assert!(data.keys().await.unwrap().is_empty());

    assert!(storage.delete("ftc-pwa-v1.0.0").await.unwrap());
    assert_eq!(storage.keys().await.unwrap(), vec!["ftc-pwa-v1.0.0-data"]);
}

#[tokio::test]
async fn memory_backend_behaves_like_cache_storage() {
    exercise(CacheStorage::new(MemoryBackend::new())).await;
}

#[tokio::test]
async fn sqlite_backend_behaves_like_cache_storage() {
    exercise(CacheStorage::new(SqliteBackend::open_in_memory().unwrap())).await;
}

#[tokio::test]
async fn sqlite_entries_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caches.db");
    let page = Request::get(url("/offline.html"));

    {
        let storage = CacheStorage::new(SqliteBackend::open(&path).unwrap());
        let shell = storage.open("ftc-pwa-v1.0.0").await.unwrap();
        shell
            .put(&page, &Response::new(page.url.clone(), StatusCode::OK, "offline"))
            .await
            .unwrap();
    }

    let storage = CacheStorage::new(SqliteBackend::open(&path).unwrap());
    assert!(storage.has("ftc-pwa-v1.0.0").await.unwrap());
    let shell = storage.open("ftc-pwa-v1.0.0").await.unwrap();
    let hit = shell.match_request(&page).await.unwrap().unwrap();
    assert_eq!(hit.text().unwrap(), "offline");
}
