use std::collections::HashMap;

use axum::body::Bytes;

/// One stored HTTP response. Whole responses only, and no ttl: the gateway
/// caches opportunistically, unlike the domain-object cache in
/// `crate::cache` which carries business-meaningful freshness.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        CachedResponse {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug)]
struct Partition {
    name: String,
    entries: HashMap<String, CachedResponse>,
}

/// Named cache partitions, mirroring the browser CacheStorage the web
/// client used: a versioned precache for shell assets plus a runtime
/// partition. Lookup across partitions follows creation order.
#[derive(Debug, Default)]
pub struct CacheStorage {
    partitions: Vec<Partition>,
}

impl CacheStorage {
    pub fn put(&mut self, partition: &str, key: &str, response: CachedResponse) {
        self.open(partition)
            .entries
            .insert(key.to_string(), response);
    }

    pub fn match_in(&self, partition: &str, key: &str) -> Option<&CachedResponse> {
        self.partitions
            .iter()
            .find(|p| p.name == partition)
            .and_then(|p| p.entries.get(key))
    }

    /// First match across every partition, in creation order.
    pub fn match_any(&self, key: &str) -> Option<&CachedResponse> {
        self.partitions
            .iter()
            .find_map(|partition| partition.entries.get(key))
    }

    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.partitions.len();
        self.partitions.retain(|partition| partition.name != name);
        self.partitions.len() < before
    }

    /// Drops every partition not named in `keep`; returns the names of the
    /// ones removed.
    pub fn retain_partitions(&mut self, keep: &[&str]) -> Vec<String> {
        let mut removed = Vec::new();
        self.partitions.retain(|partition| {
            if keep.contains(&partition.name.as_str()) {
                true
            } else {
                removed.push(partition.name.clone());
                false
            }
        });
        removed
    }

    pub fn partition_names(&self) -> Vec<String> {
        self.partitions
            .iter()
            .map(|partition| partition.name.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.partitions.clear();
    }

    fn open(&mut self, name: &str) -> &mut Partition {
        let index = match self.partitions.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                self.partitions.push(Partition {
                    name: name.to_string(),
                    entries: HashMap::new(),
                });
                self.partitions.len() - 1
            }
        };
        &mut self.partitions[index]
    }
}
