/// The error type for the fallible operations of
/// [`ConcurrentMap`][map], such as [`try_put`][try-put].
///
/// [map]: ./struct.ConcurrentMap.html
/// [try-put]: ./struct.ConcurrentMap.html#method.try_put
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// A bucket array with the given number of buckets could not be allocated.
    ///
    /// When this is returned by a put, the map is left exactly as it was before
    /// the call: the entry was not inserted and no value was replaced.
    #[error("failed to allocate a bucket array of {capacity} buckets")]
    AllocationFailed { capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::MapError;

    #[test]
    fn error_message_names_the_capacity() {
        let e = MapError::AllocationFailed { capacity: 1 << 20 };
        assert_eq!(
            e.to_string(),
            "failed to allocate a bucket array of 1048576 buckets"
        );
    }
}
