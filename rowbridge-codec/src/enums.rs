use rowbridge_result::{Error, Result};
use rowbridge_types::{EnumDictionary, Oid};

/// Dictionary key for the enum member `oid`.
pub fn enum_oid_to_key(dict: &EnumDictionary, oid: Oid) -> Result<u32> {
    dict.position_of(oid)
        .map(|p| p as u32)
        .ok_or_else(|| {
            Error::corrupt(format_args!(
                "value {oid} is not a member of enum {}",
                dict.type_name
            ))
        })
}

/// Enum member id for dictionary key `key`.
pub fn enum_key_to_oid(dict: &EnumDictionary, key: usize) -> Result<Oid> {
    dict.oid_at(key).ok_or_else(|| {
        Error::InvalidArgumentError(format!(
            "dictionary key {key} is out of range for enum {} with {} members",
            dict.type_name,
            dict.len()
        ))
    })
}
