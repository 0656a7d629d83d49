mod form_keys;
mod record;
mod store;

pub use form_keys::{
    decode_field_token, encode_field_token, id_from_publish_field, publish_field_name,
    PUBLISH_FIELD_PREFIX,
};
pub use record::{new_design_id, now_utc_iso, DesignRecord, DesignSource};
pub use store::{newest_first, DesignStore, PublishOutcome};
