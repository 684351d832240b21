//! Set operations over migration collections, keyed by version only.
//!
//! Every function returns a fresh, version-ascending vector. Where both sides carry the
//! same version, the record from the second argument is kept.

use {
    crate::core::migration::Migration,
    itertools::Itertools,
    std::collections::{BTreeMap, HashSet},
};

fn versions(migrations: &[Migration]) -> HashSet<u64> {
    migrations.iter().map(|m| m.version).collect()
}

fn ascending(map: BTreeMap<u64, &Migration>) -> Vec<Migration> {
    map.into_values().cloned().collect()
}

/// Records of `a` whose version is not in `b`.
pub fn difference(a: &[Migration], b: &[Migration]) -> Vec<Migration> {
    let exclude = versions(b);
    a.iter()
        .filter(|m| !exclude.contains(&m.version))
        .unique_by(|m| m.version)
        .sorted_by_key(|m| m.version)
        .cloned()
        .collect()
}

/// Records whose version is in `a` or `b`; `b` wins on duplicates.
pub fn union(a: &[Migration], b: &[Migration]) -> Vec<Migration> {
    let mut map: BTreeMap<u64, &Migration> = BTreeMap::new();
    for m in a {
        map.entry(m.version).or_insert(m);
    }
    let mut seen = HashSet::new();
    for m in b {
        if seen.insert(m.version) {
            map.insert(m.version, m);
        }
    }
    ascending(map)
}

/// Records whose version is in both; the value comes from `b`.
pub fn intersection(a: &[Migration], b: &[Migration]) -> Vec<Migration> {
    let keep = versions(a);
    let mut map: BTreeMap<u64, &Migration> = BTreeMap::new();
    for m in b.iter().filter(|m| keep.contains(&m.version)) {
        map.entry(m.version).or_insert(m);
    }
    ascending(map)
}

pub fn symmetric_difference(a: &[Migration], b: &[Migration]) -> Vec<Migration> {
    union(&difference(a, b), &difference(b, a))
}

/// What exists in `a` but not in `b`: the pending set for `a` = disk, `b` = ledger.
pub fn superset_of(a: &[Migration], b: &[Migration]) -> Vec<Migration> {
    difference(a, b)
}

/// Index a collection by version; the first record per version is kept.
pub fn by_version(migrations: &[Migration]) -> BTreeMap<u64, &Migration> {
    let mut map = BTreeMap::new();
    for m in migrations {
        map.entry(m.version).or_insert(m);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(version: u64, tag: &str) -> Migration {
        Migration::new(version, format!("{}_{}", version, tag), format!("select {};", version), "")
    }

    fn versions_of(v: &[Migration]) -> Vec<u64> {
        v.iter().map(|m| m.version).collect()
    }

    #[test]
    fn test_difference() {
        let a = vec![m(3, "a"), m(1, "a"), m(2, "a")];
        let b = vec![m(2, "b"), m(9, "b")];
        let d = difference(&a, &b);
        assert_eq!(versions_of(&d), vec![1, 3]);
        assert!(d.iter().all(|x| !versions(&b).contains(&x.version)));
        assert!(d.iter().all(|x| a.contains(x)));
        assert!(difference(&a, &a).is_empty());
    }

    #[test]
    fn test_union_second_wins() {
        let a = vec![m(1, "a"), m(2, "a")];
        let b = vec![m(2, "b"), m(3, "b")];
        let u = union(&a, &b);
        assert_eq!(versions_of(&u), vec![1, 2, 3]);
        assert_eq!(u[1].name, "2_b");
        assert_eq!(versions_of(&union(&b, &a)), versions_of(&u));
        assert_eq!(union(&b, &a)[1].name, "2_a");
    }

    #[test]
    fn test_intersection_takes_second() {
        let a = vec![m(1, "a"), m(2, "a"), m(4, "a")];
        let b = vec![m(4, "b"), m(2, "b"), m(3, "b")];
        let i = intersection(&a, &b);
        assert_eq!(versions_of(&i), vec![2, 4]);
        assert!(i.iter().all(|x| x.name.ends_with("_b")));
        assert_eq!(versions_of(&intersection(&b, &a)), vec![2, 4]);
        assert!(intersection(&b, &a).iter().all(|x| x.name.ends_with("_a")));
    }

    #[test]
    fn test_symmetric_difference() {
        let a = vec![m(1, "a"), m(2, "a"), m(3, "a")];
        let b = vec![m(3, "b"), m(4, "b")];
        let s = symmetric_difference(&a, &b);
        assert_eq!(versions_of(&s), vec![1, 2, 4]);
        assert_eq!(s.len(), difference(&a, &b).len() + difference(&b, &a).len());
        assert_eq!(symmetric_difference(&b, &a), s);
    }

    #[test]
    fn test_superset_of_is_pending() {
        let disk = vec![m(1, "d"), m(2, "d"), m(3, "d")];
        let ledger = vec![m(2, "l"), m(1, "l")];
        assert_eq!(versions_of(&superset_of(&disk, &ledger)), vec![3]);
        assert!(superset_of(&ledger, &disk).is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(union(&[], &[]).is_empty());
        assert!(intersection(&[m(1, "a")], &[]).is_empty());
        assert_eq!(versions_of(&difference(&[m(1, "a")], &[])), vec![1]);
    }
}
