//! Sort functions so the hot ones get the short LEB indices, without ever
//! paying for it: a function may move freely inside its LEB bucket (the
//! range of final indices sharing an encoded width) but never across one.
//! Within a bucket, a secondary sort pulls functions with similar bodies
//! next to each other, which helps gzip.
//!
//! Use counts are static: call sites, plus one per start function, export
//! value, and table element. Imports keep their positions; only owned
//! functions are reordered.

use crate::binary::encode_function_body;
use crate::entity::EntityRef;
use crate::errors::OptError;
use crate::ir::{Expr, ExprData, ExportKind, Func, FuncDecl, FunctionBody, Module};
use crate::passes::Pass;
use fxhash::FxHashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Cap on histogram buckets kept per profile; only the most frequent stay.
pub const MAX_HASHES: usize = 768;

/// Distance under which two bodies count as already-similar: such runs are
/// kept in their current order rather than shuffled.
pub const SIMILAR_SIMILARITY: f64 = 0.05;

pub struct ReorderFunctions;

impl Pass for ReorderFunctions {
    fn name(&self) -> &'static str {
        "reorder-functions"
    }
    fn run_module(&self, module: &mut Module) -> Result<(), OptError> {
        run(module)
    }
}

fn run(module: &mut Module) -> Result<(), OptError> {
    let num_funcs = module.funcs.len();
    let num_imports = module.num_imports();
    for (i, decl) in module.funcs.values().enumerate() {
        if decl.is_import() != (i < num_imports) {
            return Err(OptError::IRViolation(
                "imports must precede owned functions".to_string(),
            ));
        }
    }
    if num_funcs == num_imports {
        return Ok(());
    }

    // Static use counts. The slots are preallocated so the parallel scan
    // only ever bumps existing entries.
    let counts: Vec<AtomicU32> = (0..num_funcs).map(|_| AtomicU32::new(0)).collect();
    module.funcs.as_slice().par_iter().for_each(|decl| {
        if let Some(body) = decl.body() {
            count_calls(body, body.body, &counts);
        }
    });
    let mut counts: Vec<u32> = counts.into_iter().map(|c| c.into_inner()).collect();
    if let Some(start) = module.start {
        counts[start.index()] += 1;
    }
    for export in &module.exports {
        if let ExportKind::Func(func) = export.kind {
            counts[func.index()] += 1;
        }
    }
    for &element in &module.table.func_elements {
        counts[element.index()] += 1;
    }

    // Primary sort: descending count, ties by original index.
    let mut owned: Vec<Func> = module.funcs.iter().skip(num_imports).collect();
    owned.sort_by(|&a, &b| {
        counts[b.index()]
            .cmp(&counts[a.index()])
            .then(a.index().cmp(&b.index()))
    });

    // A function must keep the LEB width of its index, so hoisting a hot
    // function never pays for itself in a wider reference elsewhere. The
    // stable sort keeps the primary order inside each bucket; bucket
    // populations match the position ranges, since owned functions only
    // permute among themselves.
    owned.sort_by_key(|&f| bucket_ordinal(f.index()));

    // Secondary sort inside each LEB bucket of the absolute (post-import)
    // index space.
    let profiles: Vec<Profile> = owned
        .par_iter()
        .map(|&func| {
            let body = module.funcs[func].body().unwrap();
            Profile::new(&encode_function_body(body))
        })
        .collect();
    let profile_of: FxHashMap<Func, usize> =
        owned.iter().enumerate().map(|(i, &f)| (f, i)).collect();

    let mut position = 0usize;
    while position < owned.len() {
        let bucket_end = bucket_end(num_imports + position) - num_imports;
        let bucket_end = bucket_end.min(owned.len());
        sort_bucket_by_similarity(&mut owned[position..bucket_end], |f| {
            &profiles[profile_of[&f]]
        });
        position = bucket_end;
    }

    // Build the permutation and apply it everywhere.
    let mut remap: BTreeMap<Func, Func> = BTreeMap::new();
    for i in 0..num_imports {
        remap.insert(Func::new(i), Func::new(i));
    }
    for (k, &func) in owned.iter().enumerate() {
        remap.insert(func, Func::new(num_imports + k));
    }
    apply_order(module, &remap);
    Ok(())
}

fn count_calls(body: &FunctionBody, e: Expr, counts: &[AtomicU32]) {
    if let ExprData::Call { target, .. } = &body.exprs[e] {
        counts[target.index()].fetch_add(1, Ordering::Relaxed);
    }
    let mut children = vec![];
    body.exprs[e].visit_children(|c| children.push(c));
    for c in children {
        count_calls(body, c, counts);
    }
}

/// End (exclusive) of the LEB bucket containing absolute index `abs`:
/// `[0, 128)`, `[128, 128 + 128^2)`, and so on.
fn bucket_end(abs: usize) -> usize {
    let mut end = 128usize;
    let mut width = 128usize;
    while abs >= end {
        width *= 128;
        end += width;
    }
    end
}

/// Which LEB bucket an absolute index falls in: 0 for one-byte indices,
/// 1 for two-byte, and so on.
fn bucket_ordinal(abs: usize) -> u32 {
    let mut ordinal = 0;
    let mut end = 128usize;
    let mut width = 128usize;
    while abs >= end {
        width *= 128;
        end += width;
        ordinal += 1;
    }
    ordinal
}

/// Greedy similarity chaining: starting from the bucket's first element,
/// elements already within `SIMILAR_SIMILARITY` of the baseline are
/// accepted as a run in their current order; otherwise the closest element
/// comes next and becomes the new baseline.
fn sort_bucket_by_similarity<'a, F>(bucket: &mut [Func], profile: F)
where
    F: Fn(Func) -> &'a Profile,
{
    if bucket.len() <= 2 {
        return;
    }
    let mut remaining: Vec<Func> = bucket.to_vec();
    let mut result = Vec::with_capacity(bucket.len());
    let mut baseline = remaining.remove(0);
    result.push(baseline);
    while !remaining.is_empty() {
        let distances: Vec<f64> = remaining
            .iter()
            .map(|&f| profile(baseline).distance(profile(f)))
            .collect();
        let run: Vec<usize> = distances
            .iter()
            .enumerate()
            .filter(|(_, &d)| d < SIMILAR_SIMILARITY)
            .map(|(i, _)| i)
            .collect();
        if !run.is_empty() {
            let funcs: Vec<Func> = run.iter().map(|&i| remaining[i]).collect();
            for &i in run.iter().rev() {
                remaining.remove(i);
            }
            result.extend(funcs.iter().copied());
            baseline = *funcs.last().unwrap();
        } else {
            let best = distances
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .map(|(i, _)| i)
                .unwrap();
            baseline = remaining.remove(best);
            result.push(baseline);
        }
    }
    bucket.copy_from_slice(&result);
}

fn apply_order(module: &mut Module, remap: &BTreeMap<Func, Func>) {
    // Permute the function list itself.
    let old = std::mem::take(&mut module.funcs).into_vec();
    let mut new: Vec<Option<FuncDecl>> = vec![None; old.len()];
    for (i, decl) in old.into_iter().enumerate() {
        new[remap[&Func::new(i)].index()] = Some(decl);
    }
    module.funcs = new
        .into_iter()
        .map(|d| d.unwrap())
        .collect::<Vec<_>>()
        .into();

    // Rewrite every reference.
    for decl in module.funcs.values_mut() {
        if let Some(body) = decl.body_mut() {
            for data in body.exprs.values_mut() {
                if let ExprData::Call { target, .. } = data {
                    *target = remap[target];
                }
            }
        }
    }
    for element in module.table.func_elements.iter_mut() {
        *element = remap[element];
    }
    for export in module.exports.iter_mut() {
        if let ExportKind::Func(func) = &mut export.kind {
            *func = remap[func];
        }
    }
    if let Some(start) = &mut module.start {
        *start = remap[start];
    }
}

/// A similarity fingerprint: a histogram of sliding byte windows of width
/// one (weight 2) and two (weight 1), trimmed to the most frequent
/// `MAX_HASHES` buckets.
#[derive(Clone, Debug)]
pub struct Profile {
    histogram: FxHashMap<u32, u32>,
    total: u32,
}

impl Profile {
    pub fn new(bytes: &[u8]) -> Profile {
        let mut histogram: FxHashMap<u32, u32> = FxHashMap::default();
        for &b in bytes {
            *histogram.entry(b as u32).or_default() += 2;
        }
        for window in bytes.windows(2) {
            let hash = 0x1_0000 | ((window[0] as u32) << 8) | window[1] as u32;
            *histogram.entry(hash).or_default() += 1;
        }
        if histogram.len() > MAX_HASHES {
            let mut entries: Vec<(u32, u32)> = histogram.into_iter().collect();
            // Most frequent first; ties by hash for determinism.
            entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            entries.truncate(MAX_HASHES);
            histogram = entries.into_iter().collect();
        }
        let total = histogram.values().sum();
        Profile { histogram, total }
    }

    /// L1 distance normalized into [0, 1].
    pub fn distance(&self, other: &Profile) -> f64 {
        if self.total + other.total == 0 {
            return 0.0;
        }
        let mut l1 = 0u64;
        for (hash, &count) in &self.histogram {
            let other_count = other.histogram.get(hash).copied().unwrap_or(0);
            l1 += count.abs_diff(other_count) as u64;
        }
        for (hash, &count) in &other.histogram {
            if !self.histogram.contains_key(hash) {
                l1 += count as u64;
            }
        }
        l1 as f64 / (self.total + other.total) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket_end(0), 128);
        assert_eq!(bucket_end(127), 128);
        assert_eq!(bucket_end(128), 128 + 128 * 128);
        assert_eq!(bucket_end(16511), 16512);
        assert_eq!(bucket_end(16512), 16512 + 128 * 128 * 128);
        assert_eq!(bucket_ordinal(0), 0);
        assert_eq!(bucket_ordinal(127), 0);
        assert_eq!(bucket_ordinal(128), 1);
        assert_eq!(bucket_ordinal(16511), 1);
        assert_eq!(bucket_ordinal(16512), 2);
    }

    #[test]
    fn profile_distance_is_zero_for_identical() {
        let a = Profile::new(b"hello world");
        let b = Profile::new(b"hello world");
        assert_eq!(a.distance(&b), 0.0);
    }

    #[test]
    fn profile_distance_is_bounded() {
        let a = Profile::new(b"aaaaaaaaaa");
        let b = Profile::new(b"zzzzzzzzzz");
        let d = a.distance(&b);
        assert!(d > 0.9 && d <= 1.0);
    }

    #[test]
    fn profile_distance_orders_by_similarity() {
        let base = Profile::new(b"abcabcabc");
        let close = Profile::new(b"abcabcabd");
        let far = Profile::new(b"xyzxyzxyz");
        assert!(base.distance(&close) < base.distance(&far));
    }
}
