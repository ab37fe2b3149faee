//! Load balancers search a worksheet for a complete mapping.

use tracing::debug;

use crate::mapping::Mapping;
use crate::worksheet::MappingWorksheet;

/// Strategy that maps work chunks to executor chunks.
///
/// A returned mapping must be completely valid. `None` means the task cannot be
/// placed on the offered slots right now.
pub trait LoadBalancer: Send + Sync {
    fn name(&self) -> &str;

    fn map<'w>(&self, worksheet: &'w MappingWorksheet) -> Option<Mapping<'w>>;
}

/// Applicable executor chunks for `work`, the one it last ran on first.
fn candidates(worksheet: &MappingWorksheet, work: usize) -> Vec<usize> {
    let chunk = worksheet.work(work);
    let mut order: Vec<usize> = worksheet
        .applicable_executor_chunks(chunk)
        .into_iter()
        .map(|e| e.index())
        .collect();
    let preferred = chunk
        .last_built_on()
        .and_then(|preferred| order.iter().position(|&e| e == preferred));
    if let Some(pos) = preferred {
        let executor = order.remove(pos);
        order.insert(0, executor);
    }
    order
}

/// Depth-first search over every assignment, with pruning.
///
/// Finds a mapping whenever one exists. The search order is fixed, so the
/// same worksheet always yields the same mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExhaustiveBalancer;

impl ExhaustiveBalancer {
    fn search(mapping: &mut Mapping<'_>, work: usize) -> bool {
        if work == mapping.size() {
            return true;
        }
        for executor in candidates(mapping.worksheet(), work) {
            mapping.assign(work, Some(executor));
            if mapping.is_partially_valid() && Self::search(mapping, work + 1) {
                return true;
            }
        }
        mapping.assign(work, None);
        false
    }
}

impl LoadBalancer for ExhaustiveBalancer {
    fn name(&self) -> &str {
        "exhaustive"
    }

    fn map<'w>(&self, worksheet: &'w MappingWorksheet) -> Option<Mapping<'w>> {
        let mut mapping = Mapping::new(worksheet);
        if Self::search(&mut mapping, 0) {
            Some(mapping)
        } else {
            debug!(task = %worksheet.task().name, "No complete mapping exists");
            None
        }
    }
}

/// Takes the first executor chunk with room for each work chunk in turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyBalancer;

impl LoadBalancer for GreedyBalancer {
    fn name(&self) -> &str {
        "greedy"
    }

    fn map<'w>(&self, worksheet: &'w MappingWorksheet) -> Option<Mapping<'w>> {
        let mut mapping = Mapping::new(worksheet);
        for work in 0..mapping.size() {
            let placed = candidates(worksheet, work).into_iter().any(|executor| {
                mapping.assign(work, Some(executor));
                mapping.is_partially_valid()
            });
            if !placed {
                debug!(task = %worksheet.task().name, work, "Greedy placement failed");
                return None;
            }
        }
        Some(mapping)
    }
}
