//! Value Marshaller
//!
//! Symmetric conversion between caller values and what the engine stores.
//!
//! - `codec.rs` - native -> storage (`serialize`)
//! - `decoder.rs` - storage -> native, pluggable per field
//! - `field_names.rs` - canonical spelling for case-folded column names

mod codec;
mod decoder;
mod field_names;

pub use codec::{SerializationOutcome, format_date, serialize, to_json};
pub use decoder::{HeuristicDecoder, SchemaDecoder, TypeDecoder, decode_text, parse_iso_date};
pub use field_names::canonical_field_name;

use crate::cache::BoundedCache;
use crate::config::AdapterConfig;
use crate::core::{Record, SqlValue, Value};
use crate::storage::Row;
use std::sync::{Arc, Mutex, PoisonError};

pub struct Marshaller {
    decoder: Arc<dyn TypeDecoder>,
    names: Mutex<BoundedCache<String, String>>,
}

impl Marshaller {
    pub fn new(config: &AdapterConfig) -> Self {
        let decoder = HeuristicDecoder::new(
            config.boolean_fields.clone(),
            config.value_cache_capacity,
            config.value_cache_max_len,
        );
        Self::with_decoder(Arc::new(decoder), config.value_cache_capacity)
    }

    pub fn with_decoder(decoder: Arc<dyn TypeDecoder>, name_cache_capacity: usize) -> Self {
        Self {
            decoder,
            names: Mutex::new(BoundedCache::new(name_cache_capacity)),
        }
    }

    pub fn serialize(&self, value: &Value) -> SerializationOutcome {
        serialize(value)
    }

    pub fn deserialize(&self, value: SqlValue, field: &str) -> Value {
        self.decoder.decode(field, value)
    }

    pub fn normalize_field_name(&self, key: &str) -> String {
        {
            let names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(name) = names.get(key) {
                return name.clone();
            }
        }

        let canonical = canonical_field_name(key).unwrap_or(key).to_string();
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), canonical.clone());
        canonical
    }

    pub fn deserialize_row(&self, row: Row) -> Record {
        row.into_iter()
            .map(|(key, value)| {
                let field = self.normalize_field_name(&key);
                let decoded = self.deserialize(value, &field);
                (field, decoded)
            })
            .collect()
    }

    pub fn clear_cache(&self) {
        self.decoder.clear_cache();
        self.names.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
