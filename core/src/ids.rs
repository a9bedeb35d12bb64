use rand::RngCore;

/// Generates an opaque 128-bit identifier as lowercase hex, used for both
/// `file_id` and `chunk_id`.
pub fn new_hex_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hex_id_is_32_hex_chars() {
        let id = new_hex_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_hex_id_is_unique_across_calls() {
        let a = new_hex_id();
        let b = new_hex_id();
        assert_ne!(a, b);
    }
}
