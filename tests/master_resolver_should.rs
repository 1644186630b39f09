mod common;

use std::sync::Arc;
use std::time::Duration;

use proxy::config::AppConfig;
use proxy::server::error::Error;
use proxy::server::services::fetch_services::MockFetchServiceTrait;
use proxy::server::services::playlist_services::PlaylistService;
use proxy::server::services::proxy_cache_services::NoopProxyCacheService;

use common::{MemoryCache, SharedCache, playlist_content, opaque_content, settle_cache_writes};

const MASTER_URL: &str = "https://a.com/live/master.m3u8";

fn service(fetch: MockFetchServiceTrait, cache: SharedCache) -> PlaylistService {
    PlaylistService::new(Arc::new(fetch), cache, Arc::new(AppConfig::default()))
}

#[tokio::test]
async fn test_picks_highest_bandwidth_variant() {
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
        low/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720\n\
        high/index.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/high/index.m3u8")
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    let resolved = service.process(MASTER_URL, master, 0).await.unwrap();

    assert!(resolved.contains("/proxy/https%3A%2F%2Fa.com%2Flive%2Fhigh%2Fseg.ts"));
}

#[tokio::test]
async fn test_equal_bandwidth_tie_selects_later_entry() {
    // selection scans forward with >=, so of two equal-bandwidth variants the
    // second one in document order wins - intentional, matched to the behavior
    // players have been getting all along
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=500000\n\
        variant-a.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=500000\n\
        variant-b.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/variant-b.m3u8")
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    let resolved = service.process(MASTER_URL, master, 0).await.unwrap();

    assert!(resolved.contains("seg.ts"));
}

#[tokio::test]
async fn test_missing_bandwidth_defaults_to_zero() {
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:CODECS=\"avc1.4d401f\"\n\
        only.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/only.m3u8")
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    assert!(service.process(MASTER_URL, master, 0).await.is_ok());
}

#[tokio::test]
async fn test_stream_inf_without_uri_is_skipped() {
    // the trailing STREAM-INF never gets a uri line, so the low variant wins
    // despite its lower bandwidth
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=100000\n\
        low.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2000000\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/low.m3u8")
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    assert!(service.process(MASTER_URL, master, 0).await.is_ok());
}

#[tokio::test]
async fn test_variant_fetch_carries_no_client_headers() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|_, headers| {
            headers.accept.is_none()
                && headers.accept_language.is_none()
                && headers.referer.is_none()
        })
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    assert!(service.process(MASTER_URL, master, 0).await.is_ok());
}

#[tokio::test]
async fn test_nested_master_resolves_through() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nmid.m3u8\n";
    let mid = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nfinal.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/mid.m3u8")
        .times(1)
        .returning(move |_, _| Ok(playlist_content(mid)));
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/final.m3u8")
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    let resolved = service.process(MASTER_URL, master, 0).await.unwrap();

    assert!(resolved.contains("/proxy/https%3A%2F%2Fa.com%2Flive%2Fseg.ts"));
}

#[tokio::test]
async fn test_recursion_limit_stops_master_chains() {
    // every variant resolves to the same master again, which would recurse
    // forever without the depth bound
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1000\ndeeper.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .returning(move |_, _| Ok(playlist_content(master)));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    let err = service.process(MASTER_URL, master, 0).await.unwrap_err();

    assert!(matches!(
        err,
        Error::RecursionLimitExceeded { limit: 5, .. }
    ));
}

#[tokio::test]
async fn test_fallback_to_first_m3u8_reference_without_stream_inf() {
    let master = "#EXTM3U\n\
        #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"en\"\n\
        audio/en/index.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .withf(|url, _| url == "https://a.com/live/audio/en/index.m3u8")
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    assert!(service.process(MASTER_URL, master, 0).await.is_ok());
}

#[tokio::test]
async fn test_degenerate_master_rewritten_as_media_without_fetch() {
    // classified master (has #EXT-X-MEDIA:) but nothing selectable in it,
    // no expectations set so any fetch would panic the mock
    let master = "#EXTM3U\n\
        #EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",INSTREAM-ID=\"CC1\"\n";

    let fetch = MockFetchServiceTrait::new();
    let service = service(fetch, Arc::new(NoopProxyCacheService));
    let resolved = service.process(MASTER_URL, master, 0).await.unwrap();

    // tag lines pass through a media rewrite untouched
    assert!(resolved.contains("#EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS"));
}

#[tokio::test]
async fn test_non_playlist_variant_body_rewritten_as_media() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/index.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .times(1)
        .returning(|_, _| Ok(opaque_content(b"seg0.ts\nseg1.ts\n", "text/plain")));

    let service = service(fetch, Arc::new(NoopProxyCacheService));
    let resolved = service.process(MASTER_URL, master, 0).await.unwrap();

    assert!(resolved.contains("/proxy/https%3A%2F%2Fa.com%2Flive%2Flow%2Fseg0.ts"));
}

#[tokio::test]
async fn test_cached_subplaylist_suppresses_refetch() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .times(1)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    let cache: SharedCache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
    let service = service(fetch, cache);

    let first = service.process(MASTER_URL, master, 0).await.unwrap();
    settle_cache_writes().await;
    let second = service.process(MASTER_URL, master, 0).await.unwrap();

    // the mock's times(1) is the real assertion, a second upstream fetch panics
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_expired_cache_entry_fetches_again() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n";

    let mut fetch = MockFetchServiceTrait::new();
    fetch
        .expect_fetch()
        .times(2)
        .returning(|_, _| Ok(playlist_content("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n")));

    // zero ttl, everything is expired the moment it lands
    let cache: SharedCache = Arc::new(MemoryCache::new(Duration::ZERO));
    let service = service(fetch, cache);

    service.process(MASTER_URL, master, 0).await.unwrap();
    settle_cache_writes().await;
    service.process(MASTER_URL, master, 0).await.unwrap();
}
