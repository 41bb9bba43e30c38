use serde::Serializer;

pub fn serialize_u32_hex<S>(value: &u32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{:08x}", value))
}

pub fn serialize_guid<S>(value: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let hex: String = value.iter().map(|b| format!("{:02x}", b)).collect();
    serializer.serialize_str(&hex)
}
