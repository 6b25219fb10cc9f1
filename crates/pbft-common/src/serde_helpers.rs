/// Serde helper for fixed-size byte arrays carried as lowercase hex strings.
///
/// Standard serde only derives array impls up to `[T; 32]` and writes them as
/// number sequences; keys, digests and signatures cross the wire as hex instead.
pub mod hex_array {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        bytes.try_into().map_err(|v: Vec<u8>| {
            de::Error::custom(format!("expected {} bytes, got {}", N, v.len()))
        })
    }
}
