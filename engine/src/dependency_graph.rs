//! FILENAME: engine/src/dependency_graph.rs
//! PURPOSE: Directed graph between fully-qualified cell locations, tracking
//! precedents/dependents and driving the recalculation order (§3, §4.8).
//! CONTEXT: Keyed by `CellLocation` (which always carries a concrete sheet
//! name once it reaches the graph) rather than a sheet-less coordinate pair,
//! so cross-sheet formulas are first-class edges instead of a special case.

use parser::CellLocation;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    pub cycle_path: Vec<CellLocation>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "circular reference: ")?;
        for (i, loc) in self.cycle_path.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {}

/// Two parallel adjacency maps keyed by fully-qualified `CellLocation`, per
/// §3: `dependents[a]` containing `b` always has a matching `precedents[b]`
/// containing `a`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    precedents: HashMap<CellLocation, HashSet<CellLocation>>,
    dependents: HashMap<CellLocation, HashSet<CellLocation>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph { precedents: HashMap::new(), dependents: HashMap::new() }
    }

    /// Replaces `cell`'s precedent edges. Called after parsing a formula's
    /// new AST, once `clear_dependencies` has removed the stale edges (§4.8:
    /// "before applying the new content... remove all edges leaving that
    /// cell. After parsing... add edges for every dependency").
    pub fn set_dependencies(&mut self, cell: CellLocation, new_precedents: HashSet<CellLocation>) {
        self.clear_dependencies(&cell);
        if new_precedents.is_empty() {
            return;
        }
        for prec in &new_precedents {
            self.dependents.entry(prec.clone()).or_default().insert(cell.clone());
        }
        self.precedents.insert(cell, new_precedents);
    }

    pub fn clear_dependencies(&mut self, cell: &CellLocation) {
        if let Some(old_precs) = self.precedents.remove(cell) {
            for prec in old_precs {
                if let Some(deps) = self.dependents.get_mut(&prec) {
                    deps.remove(cell);
                    if deps.is_empty() {
                        self.dependents.remove(&prec);
                    }
                }
            }
        }
    }

    pub fn get_precedents(&self, cell: &CellLocation) -> Option<&HashSet<CellLocation>> {
        self.precedents.get(cell)
    }

    pub fn get_dependents(&self, cell: &CellLocation) -> Option<&HashSet<CellLocation>> {
        self.dependents.get(cell)
    }

    /// Transitive dependents of `cell` (visited-set guarded, per §4.8), used
    /// to build the invalid-cell set after a write.
    pub fn transitive_dependents(&self, cell: &CellLocation) -> HashSet<CellLocation> {
        let mut result = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(deps) = self.dependents.get(cell) {
            queue.extend(deps.iter().cloned());
        }
        while let Some(current) = queue.pop_front() {
            if result.contains(&current) {
                continue;
            }
            result.insert(current.clone());
            if let Some(deps) = self.dependents.get(&current) {
                for dep in deps {
                    if !result.contains(dep) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        result
    }

    /// Cells to recalculate after `changed`'s value changes, in a legal
    /// (precedents-before-dependents) order, via Kahn's algorithm restricted
    /// to the affected subset.
    pub fn recalc_order(&self, changed: &CellLocation) -> Result<Vec<CellLocation>, CycleError> {
        let affected = self.transitive_dependents(changed);
        if affected.is_empty() {
            return Ok(Vec::new());
        }
        self.topological_sort(&affected)
    }

    /// Orders an arbitrary (e.g. invalid-set-driven) subset of cells rather
    /// than one cell's transitive dependents; used by the recalculation
    /// driver, which accumulates invalid cells from several edits at once.
    pub fn order_subset(&self, cells: &HashSet<CellLocation>) -> Result<Vec<CellLocation>, CycleError> {
        self.topological_sort(cells)
    }

    fn topological_sort(&self, cells: &HashSet<CellLocation>) -> Result<Vec<CellLocation>, CycleError> {
        let mut in_degree: HashMap<CellLocation, usize> = cells.iter().map(|c| (c.clone(), 0)).collect();
        for cell in cells {
            if let Some(precs) = self.precedents.get(cell) {
                for prec in precs {
                    if cells.contains(prec) {
                        *in_degree.get_mut(cell).unwrap() += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<CellLocation> =
            in_degree.iter().filter(|(_, &deg)| deg == 0).map(|(c, _)| c.clone()).collect();
        let mut result = Vec::with_capacity(cells.len());

        while let Some(cell) = queue.pop_front() {
            result.push(cell.clone());
            if let Some(deps) = self.dependents.get(&cell) {
                for dep in deps {
                    if let Some(deg) = in_degree.get_mut(dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dep.clone());
                        }
                    }
                }
            }
        }

        if result.len() != cells.len() {
            let cycle_cells: Vec<CellLocation> =
                in_degree.iter().filter(|(_, &deg)| deg > 0).map(|(c, _)| c.clone()).collect();
            return Err(CycleError { cycle_path: cycle_cells });
        }
        Ok(result)
    }

    /// Drops every edge touching locations in `sheet` (e.g. before a sheet
    /// removal); used ahead of a full recalculate so stale edges are never
    /// relied upon (§3's Workbook invariant).
    pub fn clear_sheet(&mut self, sheet: &str) {
        let in_sheet = |loc: &CellLocation| loc.sheet.as_deref() == Some(sheet);
        let stale: Vec<CellLocation> = self.precedents.keys().filter(|c| in_sheet(c)).cloned().collect();
        for cell in stale {
            self.clear_dependencies(&cell);
        }
        self.dependents.retain(|_, deps| {
            deps.retain(|d| !in_sheet(d));
            !deps.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.precedents.clear();
        self.dependents.clear();
    }

    pub fn formula_cell_count(&self) -> usize {
        self.precedents.len()
    }
}
