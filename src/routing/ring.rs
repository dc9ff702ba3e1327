use std::collections::BTreeSet;

/// Default number of ring positions per physical node.
pub const DEFAULT_VIRTUAL_REPLICAS: usize = 1024;

/// An immutable consistent-hash ring.
///
/// Each member occupies `replicas` points at `crc32(decimal(i) ++ member)`,
/// CRC-32 being the IEEE polynomial. A key belongs to the first point strictly
/// after its own hash, wrapping around. Clients and servers place keys with
/// this exact rule, so any change here splits the cluster's view of owners.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    replicas: usize,
    points: Vec<(u32, usize)>,
    members: Vec<String>,
}

impl HashRing {
    pub fn empty(replicas: usize) -> Self {
        Self {
            replicas,
            points: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Builds a ring over `members`; duplicates are collapsed.
    pub fn build<I, S>(members: I, replicas: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: Vec<String> = members
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();

        let mut points = Vec::with_capacity(members.len() * replicas);
        for (index, member) in members.iter().enumerate() {
            for replica in 0..replicas {
                points.push((point_hash(replica, member), index));
            }
        }
        // Members are sorted, so ties resolve the same way on every node.
        points.sort_unstable();
        points.dedup_by_key(|(hash, _)| *hash);

        Self {
            replicas,
            points,
            members,
        }
    }

    /// Member owning `key`, or `None` for an empty ring.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let hash = crc32fast::hash(key.as_ref());
        let position = self.points.partition_point(|(point, _)| *point <= hash);
        let (_, member) = self.points[position % self.points.len()];
        Some(&self.members[member])
    }

    /// Members in sorted order.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

fn point_hash(replica: usize, member: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(replica.to_string().as_bytes());
    hasher.update(member.as_bytes());
    hasher.finalize()
}
