use crate::config::TosConfig;
use crate::errors::{Error, Result};
use crate::model::{BloomLevel, MatrixCell, TopicRow, TosBlueprint, UserContext};
use crate::storage::Store;
use tracing::info;

/// Upper bound on exam length. Keeps the partition check's bitmap and the
/// item numbering well inside u32 range, and no paper exam comes close.
pub const MAX_TOTAL_ITEMS: u32 = 1000;

pub fn validate_config(cfg: &TosConfig) -> Result<()> {
    if cfg.total_items == 0 {
        return Err(Error::Validation("total_items must be at least 1".into()));
    }
    if cfg.total_items > MAX_TOTAL_ITEMS {
        return Err(Error::Validation(format!(
            "total_items {} exceeds the maximum of {}",
            cfg.total_items, MAX_TOTAL_ITEMS
        )));
    }
    if cfg.topics.is_empty() {
        return Err(Error::Validation("config has no topics".into()));
    }
    for t in &cfg.topics {
        if t.weight == 0 {
            return Err(Error::Validation(format!(
                "topic '{}' has zero weight",
                t.name
            )));
        }
    }
    let weight_sum: u32 = cfg.topics.iter().map(|t| t.weight).sum();
    if weight_sum != 100 {
        return Err(Error::Validation(format!(
            "topic weights must sum to 100, got {}",
            weight_sum
        )));
    }
    if cfg.level_split.sum() != 100 {
        return Err(Error::Validation(format!(
            "bloom level split must sum to 100, got {}",
            cfg.level_split.sum()
        )));
    }
    let band_sum: u32 = cfg.difficulty_split.iter().sum();
    if band_sum != 100 {
        return Err(Error::Validation(format!(
            "easy/average/difficult split must sum to 100, got {}",
            band_sum
        )));
    }
    if cfg.level_split.bands() != cfg.difficulty_split {
        return Err(Error::Validation(format!(
            "bloom split collapses to {:?} but difficulty_split declares {:?}",
            cfg.level_split.bands(),
            cfg.difficulty_split
        )));
    }
    Ok(())
}

/// Largest-remainder apportionment of `total_items` across the
/// topic x bloom-level grid. Every cell starts at floor(weight * pct * total);
/// leftover seats go to cells by descending fractional part, ties broken by
/// topic declaration order then canonical Bloom order.
fn apportion(cfg: &TosConfig) -> Vec<Vec<u32>> {
    let n_topics = cfg.topics.len();
    let total = cfg.total_items as u64;

    let mut counts = vec![vec![0u32; BloomLevel::ALL.len()]; n_topics];
    // (fractional part scaled by 10_000, topic idx, level idx)
    let mut fracs: Vec<(u64, usize, usize)> = Vec::with_capacity(n_topics * 6);
    let mut assigned: u64 = 0;

    for (ti, topic) in cfg.topics.iter().enumerate() {
        for (li, level) in BloomLevel::ALL.iter().enumerate() {
            let raw = topic.weight as u64 * cfg.level_split.get(*level) as u64 * total;
            counts[ti][li] = (raw / 10_000) as u32;
            assigned += raw / 10_000;
            fracs.push((raw % 10_000, ti, li));
        }
    }

    let mut remainder = (total - assigned) as usize;
    fracs.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    for (_, ti, li) in fracs {
        if remainder == 0 {
            break;
        }
        counts[ti][li] += 1;
        remainder -= 1;
    }
    counts
}

/// Build the distribution matrix: apportion counts, then assign item numbers
/// contiguously in topic-major, Bloom-order traversal.
pub fn build_matrix(cfg: &TosConfig) -> Result<Vec<TopicRow>> {
    validate_config(cfg)?;
    let counts = apportion(cfg);

    let mut next: u32 = 1;
    let mut matrix = Vec::with_capacity(cfg.topics.len());
    for (ti, topic) in cfg.topics.iter().enumerate() {
        let mut cells = Vec::with_capacity(BloomLevel::ALL.len());
        let mut topic_total = 0u32;
        for (li, level) in BloomLevel::ALL.iter().enumerate() {
            let k = counts[ti][li];
            let items: Vec<u32> = (next..next + k).collect();
            next += k;
            topic_total += k;
            cells.push(MatrixCell {
                bloom: *level,
                items,
            });
        }
        matrix.push(TopicRow {
            topic: topic.name.clone(),
            cells,
            total: topic_total,
        });
    }

    check_partition(&matrix, cfg.total_items)?;
    Ok(matrix)
}

/// Save-time invariant: the union of all item-number blocks is exactly
/// 1..=total with no gaps or overlaps.
pub fn check_partition(matrix: &[TopicRow], total: u32) -> Result<()> {
    let mut seen = vec![false; total as usize + 1];
    let mut count = 0u32;
    for row in matrix {
        for cell in &row.cells {
            for &n in &cell.items {
                if n == 0 || n > total {
                    return Err(Error::Validation(format!(
                        "item number {} outside 1..={}",
                        n, total
                    )));
                }
                if seen[n as usize] {
                    return Err(Error::Validation(format!("item number {} assigned twice", n)));
                }
                seen[n as usize] = true;
                count += 1;
            }
        }
    }
    if count != total {
        return Err(Error::Validation(format!(
            "matrix covers {} items, expected {}",
            count, total
        )));
    }
    Ok(())
}

fn level_totals(matrix: &[TopicRow]) -> [u32; 6] {
    let mut totals = [0u32; 6];
    for row in matrix {
        for (li, cell) in row.cells.iter().enumerate() {
            totals[li] += cell.items.len() as u32;
        }
    }
    totals
}

pub struct TosBuilder {
    store: Store,
}

impl TosBuilder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn build(id: &str, cfg: &TosConfig) -> Result<TosBlueprint> {
        let matrix = build_matrix(cfg)?;
        let totals = level_totals(&matrix);
        Ok(TosBlueprint {
            id: id.to_string(),
            course: cfg.course.clone(),
            period: cfg.period.clone(),
            school_year: cfg.school_year.clone(),
            total_items: cfg.total_items,
            matrix,
            level_totals: totals,
        })
    }

    /// Builds and persists a blueprint. Blueprints are immutable: an existing
    /// id is rejected rather than overwritten.
    pub fn save(&self, ctx: &UserContext, id: &str, cfg: &TosConfig) -> Result<TosBlueprint> {
        ctx.authorize_write()?;
        if self.store.get_blueprint(id)?.is_some() {
            return Err(Error::Validation(format!(
                "blueprint '{}' already exists (blueprints are immutable)",
                id
            )));
        }
        let bp = Self::build(id, cfg)?;
        self.store.save_blueprint(&bp, &ctx.user_id)?;
        info!(blueprint = id, total_items = bp.total_items, "blueprint saved");
        Ok(bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LevelSplit, TopicWeight};

    fn cfg(total: u32, weights: &[u32]) -> TosConfig {
        TosConfig {
            version: 1,
            course: "Biology".into(),
            period: "1st".into(),
            school_year: "2026-2027".into(),
            total_items: total,
            topics: weights
                .iter()
                .enumerate()
                .map(|(i, w)| TopicWeight {
                    name: format!("topic-{}", i),
                    weight: *w,
                })
                .collect(),
            level_split: LevelSplit::default(),
            difficulty_split: [30, 40, 30],
        }
    }

    #[test]
    fn rejects_bad_band_split() {
        let mut c = cfg(50, &[100]);
        c.difficulty_split = [30, 40, 31];
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn rejects_weights_not_100() {
        let c = cfg(50, &[60, 30]);
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn rejects_absurd_total_items() {
        let c = cfg(MAX_TOTAL_ITEMS + 1, &[100]);
        let err = validate_config(&c).unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"), "got {err}");
        // the cap itself is fine
        assert!(validate_config(&cfg(MAX_TOTAL_ITEMS, &[100])).is_ok());
    }

    #[test]
    fn matrix_is_exact_partition() {
        for total in [10u32, 37, 50, 100, 61] {
            let c = cfg(total, &[40, 35, 25]);
            let matrix = build_matrix(&c).unwrap();
            check_partition(&matrix, total).unwrap();
        }
    }

    #[test]
    fn fifty_fifty_scenario() {
        // total 100, two topics 50/50: each remember/understand cell gets
        // 7 or 8 items, and each level sums to 15 across both topics.
        let c = cfg(100, &[50, 50]);
        let matrix = build_matrix(&c).unwrap();
        let remember: Vec<u32> = matrix
            .iter()
            .map(|r| r.cells[0].items.len() as u32)
            .collect();
        let understand: Vec<u32> = matrix
            .iter()
            .map(|r| r.cells[1].items.len() as u32)
            .collect();
        for k in remember.iter().chain(understand.iter()) {
            assert!(*k == 7 || *k == 8, "cell size was {}", k);
        }
        assert_eq!(remember.iter().sum::<u32>(), 15);
        assert_eq!(understand.iter().sum::<u32>(), 15);
    }

    #[test]
    fn numbering_is_contiguous_per_cell() {
        let c = cfg(50, &[40, 35, 25]);
        let matrix = build_matrix(&c).unwrap();
        let mut expected = 1u32;
        for row in &matrix {
            for cell in &row.cells {
                for &n in &cell.items {
                    assert_eq!(n, expected);
                    expected += 1;
                }
            }
        }
        assert_eq!(expected, 51);
    }

    #[test]
    fn apportionment_is_deterministic() {
        let c = cfg(61, &[33, 33, 34]);
        let a = build_matrix(&c).unwrap();
        let b = build_matrix(&c).unwrap();
        let flat = |m: &Vec<TopicRow>| {
            m.iter()
                .flat_map(|r| r.cells.iter().map(|c| c.items.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(flat(&a), flat(&b));
    }
}
