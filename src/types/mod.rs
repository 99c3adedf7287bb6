//! Core types for the relocation engine.

pub mod attrs;
pub mod attrset;
pub mod snapshot;
pub mod value;

pub use attrs::AttrMap;
pub use attrset::{
    is_service_attr, is_special_attr, is_system_account, ALIAS_ATTR, COS_ID_ATTR, MAIL_HOST_ATTR,
    SERVICE_ATTRS, SIGNATURE_ID_ATTR, SIGNATURE_NAME_ATTR, SPECIAL_ATTRS, STATUS_ATTR,
    STATUS_CLOSED, SYSTEM_ACCOUNTS,
};
pub use snapshot::{AccountSnapshot, ReferenceMarks, ReplacementTable};
pub use value::AttrValue;
