use crate::store::codec::{DbKey, DbValue};

/// A logical table inside one exchange's history store.
pub trait Table {
    type Key: DbKey;
    type Value: DbValue;

    /// Single byte prefix (0x00-0xFF) allowing up to 256 tables.
    /// Each table must have a unique prefix to avoid key collisions.
    const PREFIX: u8;
}

/// Helper to define a table with its unique prefix
#[macro_export]
macro_rules! define_table {
    ($name:ident, $key:ty, $value:ty, $prefix:expr) => {
        pub struct $name;

        impl $crate::store::table::Table for $name {
            type Key = $key;
            type Value = $value;
            const PREFIX: u8 = $prefix;
        }
    };
}
