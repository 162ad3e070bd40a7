//! Prefix-compressed separator keys.

/// Produces a short key that still separates two neighbouring keys.
///
/// Given `left < right`, the result `s` must satisfy `left < s <= right`.
/// Every key in `[s, right)` routes the same way as `right`, so the tree
/// may store `s` in place of `right` as a separator.
pub trait Prefixer<K>: Send + Sync {
    fn simple_prefix(&self, left: &K, right: &K) -> K;
}

/// Shortest character prefix of the right key that sorts after the left.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringPrefixer;

impl Prefixer<String> for StringPrefixer {
    fn simple_prefix(&self, left: &String, right: &String) -> String {
        right
            .char_indices()
            .map(|(i, c)| &right[..i + c.len_utf8()])
            .find(|prefix| *prefix > left.as_str())
            .unwrap_or(right.as_str())
            .to_string()
    }
}

/// Shortest byte prefix of the right key that sorts after the left.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesPrefixer;

impl Prefixer<Vec<u8>> for BytesPrefixer {
    fn simple_prefix(&self, left: &Vec<u8>, right: &Vec<u8>) -> Vec<u8> {
        (1..=right.len())
            .map(|len| &right[..len])
            .find(|prefix| *prefix > left.as_slice())
            .unwrap_or(right.as_slice())
            .to_vec()
    }
}
