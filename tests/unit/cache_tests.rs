/*!
 * Tests for the preview artifact cache
 */

use std::time::Duration;

use subburn::app_config::PreviewConfig;
use subburn::preview::PreviewCache;
use subburn::style::{compute_key, CacheKey};

use crate::common::{sample_cues, style_with_size};

fn key(font_size: f64) -> CacheKey {
    compute_key(&sample_cues(), &style_with_size(font_size))
}

#[tokio::test]
async fn test_cache_put_withFreshEntry_shouldReturnIt() {
    let cache = PreviewCache::new(4, Duration::from_secs(60));
    cache.put(key(40.0), "artifact-40");

    assert_eq!(cache.get(&key(40.0)).as_deref(), Some("artifact-40"));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn test_cache_get_withMissingKey_shouldCountMiss() {
    let cache = PreviewCache::new(4, Duration::from_secs(60));
    assert!(cache.get(&key(40.0)).is_none());
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hit_rate(), 0.0);
}

#[tokio::test]
async fn test_cache_put_withSameKey_shouldReplaceWithoutEviction() {
    let cache = PreviewCache::new(2, Duration::from_secs(60));
    cache.put(key(40.0), "old");
    cache.put(key(40.0), "new");

    assert_eq!(cache.get(&key(40.0)).as_deref(), Some("new"));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().evictions, 0);
}

#[tokio::test]
async fn test_cache_put_beyondCapacity_shouldEvictLeastRecentlyUsed() {
    let cache = PreviewCache::new(2, Duration::from_secs(60));
    cache.put(key(40.0), "a");
    cache.put(key(44.0), "b");

    // Touch the oldest so the middle one becomes least recently used
    assert!(cache.get(&key(40.0)).is_some());
    cache.put(key(48.0), "c");

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&key(40.0)));
    assert!(!cache.contains(&key(44.0)));
    assert!(cache.contains(&key(48.0)));
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_cache_withManyInsertions_shouldNeverExceedBound() {
    let cache = PreviewCache::new(3, Duration::from_secs(60));
    for size in 0..20 {
        cache.put(key(size as f64), format!("artifact-{}", size));
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.stats().evictions, 17);
}

#[tokio::test(start_paused = true)]
async fn test_cache_get_afterTtl_shouldMissAndRemove() {
    let cache = PreviewCache::new(4, Duration::from_secs(10));
    cache.put(key(40.0), "artifact");

    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(cache.get(&key(40.0)).is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get(&key(40.0)).is_none());
    assert!(cache.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_get_shouldNotExtendLifetime() {
    let cache = PreviewCache::new(4, Duration::from_secs(10));
    cache.put(key(40.0), "artifact");

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(4)).await;
        let _ = cache.get(&key(40.0));
    }
    assert!(!cache.contains(&key(40.0)));
}

#[tokio::test(start_paused = true)]
async fn test_cache_put_afterExpiry_shouldStoreFreshEntry() {
    let cache = PreviewCache::new(4, Duration::from_secs(10));
    cache.put(key(40.0), "first");
    tokio::time::advance(Duration::from_secs(11)).await;
    cache.put(key(40.0), "second");

    assert_eq!(cache.get(&key(40.0)).as_deref(), Some("second"));
}

#[tokio::test]
async fn test_cache_clone_shouldShareStorage() {
    let cache = PreviewCache::new(4, Duration::from_secs(60));
    let other = cache.clone();
    other.put(key(40.0), "shared");
    assert!(cache.contains(&key(40.0)));
}

#[tokio::test]
async fn test_cache_clear_shouldResetEntriesAndStats() {
    let cache = PreviewCache::new(4, Duration::from_secs(60));
    cache.put(key(40.0), "artifact");
    let _ = cache.get(&key(40.0));
    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.stats(), Default::default());
}

#[test]
fn test_cache_new_withZeroSize_shouldHoldOneEntry() {
    let cache = PreviewCache::new(0, Duration::from_secs(60));
    assert_eq!(cache.max_size(), 1);
}

#[test]
fn test_cache_from_config_shouldUseConfiguredBounds() {
    let config = PreviewConfig {
        debounce_ms: 100,
        cache_max_size: 8,
        cache_ttl_secs: 30,
    };
    let cache = PreviewCache::from_config(&config);
    assert_eq!(cache.max_size(), 8);
    assert_eq!(cache.ttl(), Duration::from_secs(30));
}
