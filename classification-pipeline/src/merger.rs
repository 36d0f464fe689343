use std::collections::HashMap;

use common::storage::types::document::CategoryAssignment;

/// Merges assignment lists given in priority order into one list with unique names.
///
/// For a duplicated name the highest confidence survives; on a tie the earlier source wins.
/// The result is sorted by descending confidence, ties keeping first-seen order.
pub fn merge_assignments<I>(sources: I) -> Vec<CategoryAssignment>
where
    I: IntoIterator<Item = Vec<CategoryAssignment>>,
{
    let mut merged: Vec<CategoryAssignment> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for assignment in sources.into_iter().flatten() {
        match positions.get(&assignment.name) {
            Some(&index) => {
                if let Some(existing) = merged.get_mut(index) {
                    if assignment.confidence > existing.confidence {
                        *existing = assignment;
                    }
                }
            }
            None => {
                positions.insert(assignment.name.clone(), merged.len());
                merged.push(assignment);
            }
        }
    }

    merged.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    merged
}
