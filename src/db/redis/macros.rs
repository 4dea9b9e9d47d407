/// Read-through caching around an async computation.
///
/// Returns the cached value when present. On a miss the future is awaited,
/// its value queued for a background write with the given TTL, and returned.
/// A failed cache read is logged and treated as a miss.
///
/// # Arguments
/// * `$cache`: a `Cache` (anything with `get_from_cache` and `set_in_background`).
/// * `$key`: the `CacheKey` to read and write.
/// * `$ttl`: time-to-live in seconds for the written value.
/// * `$block`: future producing `AppResult<T>` on a miss.
///
/// # Example
/// ```rust,ignore
/// let similarity: f64 = cached!(self.cache, key, 3600, async {
///     self.fetch_similarity(user_id, resource_id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        let hit = match $cache.get_from_cache(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, computing value");
                None
            }
        };

        match hit {
            Some(cached) => Ok(cached),
            None => match $block.await {
                Ok(value) => {
                    $cache.set_in_background(&key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        }
    }};
}
