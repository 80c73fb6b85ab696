//! Out-of-line value storage for one relation.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use rowbridge_codec::varlena::{compress_body, make_external_pointer};
use rowbridge_codec::{CompressionMethod, ToastFetcher, ToastPointer};
use rowbridge_result::{Error, Result};
use rowbridge_types::{Oid, VARHDRSZ};
use rustc_hash::FxHashMap;

/// Toast table keyed by value id.
#[derive(Debug)]
pub struct ToastStore {
    toast_relid: Oid,
    next_value_id: AtomicU32,
    values: RwLock<FxHashMap<Oid, Vec<u8>>>,
}

impl ToastStore {
    pub fn new(toast_relid: Oid) -> Self {
        Self {
            toast_relid,
            next_value_id: AtomicU32::new(1),
            values: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn toast_relid(&self) -> Oid {
        self.toast_relid
    }

    /// Move `payload` out of line and return the pointer bytes to store in
    /// the tuple. Compression is kept only when it actually saves space.
    pub fn store(&self, payload: &[u8], compression: Option<CompressionMethod>) -> Vec<u8> {
        let (stored, compression) = match compression {
            Some(method) => {
                let body = compress_body(payload, method);
                if body.len() < payload.len() {
                    (body, Some(method))
                } else {
                    (payload.to_vec(), None)
                }
            }
            None => (payload.to_vec(), None),
        };
        let value_id = self.next_value_id.fetch_add(1, Ordering::Relaxed);
        let pointer = ToastPointer {
            raw_size: payload.len() + VARHDRSZ,
            ext_size: stored.len(),
            compression,
            value_id,
            toast_relid: self.toast_relid,
        };
        tracing::trace!(value_id, ext_size = stored.len(), ?compression, "toast store");
        self.values
            .write()
            .expect("toast lock poisoned")
            .insert(value_id, stored);
        make_external_pointer(&pointer)
    }

    pub fn len(&self) -> usize {
        self.values.read().expect("toast lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ToastFetcher for ToastStore {
    fn fetch_toast(&self, pointer: &ToastPointer) -> Result<Vec<u8>> {
        if pointer.toast_relid != self.toast_relid {
            return Err(Error::corrupt(format_args!(
                "toast pointer for relation {} read through relation {}",
                pointer.toast_relid, self.toast_relid
            )));
        }
        self.values
            .read()
            .expect("toast lock poisoned")
            .get(&pointer.value_id)
            .cloned()
            .ok_or(Error::NotFound)
    }
}
