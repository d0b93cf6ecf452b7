use super::object::{GcSize, Object, ObjectType};

/// Immutable, interned byte string (spec.md §3 "String").
#[repr(C)]
pub struct ObjectString {
    pub object: Object,
    pub content: String,
    pub hash: u32,
}

impl ObjectString {
    pub fn new(content: &str) -> Box<ObjectString> {
        let hash = fnv1a_hash(content.as_bytes());
        Box::new(ObjectString {
            object: Object::new(ObjectType::String),
            content: content.to_string(),
            hash,
        })
    }
}

/// FNV-1a over raw bytes, as spec.md §3 mandates for the cached string hash.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 2166136261;
    const FNV_PRIME: u32 = 16777619;
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl GcSize for ObjectString {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectString>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.content.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_contents_hash_identically() {
        let a = ObjectString::new("hello");
        let b = ObjectString::new("hello");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn different_contents_usually_hash_differently() {
        let a = ObjectString::new("hello");
        let b = ObjectString::new("world");
        assert_ne!(a.hash, b.hash);
    }
}
