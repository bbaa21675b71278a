//! Grid: addressable board of symbol entities
//!
//! Cells are addressed by `(reel, position, layer)`. Position 0 is the top
//! row for [`RowOrigin::TopDown`] grids and the bottom row for
//! [`RowOrigin::BottomUp`] grids; every grid declares which one it uses.
//!
//! ```text
//!            reel 0  reel 1  reel 2  reel 3  reel 4
//! TopDown    pos 0   ...                             ← top row
//!            pos 1
//!            pos 2                                   ← bottom row
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BoardError, BoardResult};

// ═══════════════════════════════════════════════════════════════════════════════
// SHAPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Which visual row position 0 refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrigin {
    /// Position 0 is the top row
    #[default]
    TopDown,
    /// Position 0 is the bottom row
    BottomUp,
}

/// Grid dimensions and conventions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub reels: usize,
    pub rows: usize,
    #[serde(default = "default_layers")]
    pub layers: usize,
    #[serde(default)]
    pub origin: RowOrigin,
    /// Symbol placed in every cell of a fresh grid
    #[serde(default = "default_fill")]
    pub fill_symbol: String,
}

fn default_layers() -> usize {
    1
}

fn default_fill() -> String {
    "A".to_string()
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            reels: 5,
            rows: 3,
            layers: 1,
            origin: RowOrigin::TopDown,
            fill_symbol: default_fill(),
        }
    }
}

impl GridSpec {
    pub fn new(reels: usize, rows: usize) -> Self {
        Self {
            reels,
            rows,
            ..Default::default()
        }
    }

    /// Builder: set layer count
    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    /// Builder: set row origin
    pub fn with_origin(mut self, origin: RowOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Builder: set fill symbol
    pub fn with_fill(mut self, symbol: impl Into<String>) -> Self {
        self.fill_symbol = symbol.into();
        self
    }

    pub fn cell_count(&self) -> usize {
        self.reels * self.rows * self.layers
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.reels == 0 || self.rows == 0 || self.layers == 0 {
            return Err(BoardError::InvalidGrid(format!(
                "{}x{}x{} has no cells",
                self.reels, self.rows, self.layers
            )));
        }
        if self.fill_symbol.is_empty() {
            return Err(BoardError::InvalidGrid("empty fill symbol".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Cell coordinate (no lifetime; use [`Grid::resolve`] to get a [`SymbolRef`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPos {
    #[serde(alias = "reel_index")]
    pub reel: usize,
    #[serde(alias = "pos")]
    pub position: usize,
    #[serde(default)]
    pub layer: usize,
}

impl CellPos {
    pub fn new(reel: usize, position: usize) -> Self {
        Self {
            reel,
            position,
            layer: 0,
        }
    }

    pub fn on_layer(mut self, layer: usize) -> Self {
        self.layer = layer;
        self
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.reel, self.position, self.layer)
    }
}

/// Identity of a symbol entity; survives `mutate_to`, not a reel stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

/// Resolved reference to one symbol entity
///
/// Valid until the next [`Grid::begin_spin`], and only while the same entity
/// occupies the cell. Using a stale reference fails with
/// `MissingAnimationTarget` instead of touching whatever symbol is there now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub cell: CellPos,
    pub symbol: SymbolId,
    pub epoch: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYMBOLS
// ═══════════════════════════════════════════════════════════════════════════════

/// A symbol entity on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Number of `mutate_to` calls this entity went through
    pub transitions: u32,
}

/// How a symbol replacement is presented
///
/// Two explicit flags; "silently replace" and "replace and animate" are
/// different calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateOptions {
    /// Swap without the transition animation
    pub skip_animation: bool,
    /// Play the replacement effect on the cell
    pub play_effect: bool,
}

impl MutateOptions {
    /// Animated transition, no extra effect
    pub fn animated() -> Self {
        Self::default()
    }

    /// Instant swap, nothing plays
    pub fn silent() -> Self {
        Self {
            skip_animation: true,
            play_effect: false,
        }
    }

    /// Animated transition plus the replacement effect
    pub fn with_effect() -> Self {
        Self {
            skip_animation: false,
            play_effect: true,
        }
    }
}

/// Record of one `mutate_to` call, drained by presentation collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolChange {
    pub cell: CellPos,
    pub symbol: SymbolId,
    pub from: String,
    pub to: String,
    pub skip_animation: bool,
    pub play_effect: bool,
}

/// Comparable view of a grid: names per layer/reel/position plus locks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// `layers[layer][reel][position]`
    pub layers: Vec<Vec<Vec<String>>>,
    pub locked_reels: Vec<usize>,
}

impl GridSnapshot {
    pub fn name_at(&self, cell: CellPos) -> Option<&str> {
        self.layers
            .get(cell.layer)?
            .get(cell.reel)?
            .get(cell.position)
            .map(String::as_str)
    }

    /// Cells whose symbol name differs from `other` (shapes must match)
    pub fn diff(&self, other: &GridSnapshot) -> Vec<CellPos> {
        let mut cells = Vec::new();
        for (layer, reels) in self.layers.iter().enumerate() {
            for (reel, positions) in reels.iter().enumerate() {
                for (position, name) in positions.iter().enumerate() {
                    let cell = CellPos::new(reel, position).on_layer(layer);
                    if other.name_at(cell) != Some(name.as_str()) {
                        cells.push(cell);
                    }
                }
            }
        }
        cells
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GRID
// ═══════════════════════════════════════════════════════════════════════════════

/// The board
#[derive(Debug, Clone)]
pub struct Grid {
    spec: GridSpec,
    epoch: u64,
    next_symbol: u64,
    cells: Vec<Symbol>,
    locked: BTreeSet<usize>,
    changes: Vec<SymbolChange>,
}

impl Grid {
    /// Create a grid filled with `spec.fill_symbol`
    pub fn new(spec: GridSpec) -> BoardResult<Self> {
        spec.validate()?;
        let fill = spec.fill_symbol.clone();
        let mut grid = Self {
            cells: Vec::with_capacity(spec.cell_count()),
            spec,
            epoch: 0,
            next_symbol: 0,
            locked: BTreeSet::new(),
            changes: Vec::new(),
        };
        for _ in 0..grid.spec.cell_count() {
            let symbol = grid.fresh_symbol(&fill);
            grid.cells.push(symbol);
        }
        Ok(grid)
    }

    /// Single-layer top-down grid filled with one symbol
    pub fn filled(reels: usize, rows: usize, symbol: &str) -> BoardResult<Self> {
        Self::new(GridSpec::new(reels, rows).with_fill(symbol))
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn reels(&self) -> usize {
        self.spec.reels
    }

    pub fn rows(&self) -> usize {
        self.spec.rows
    }

    pub fn layers(&self) -> usize {
        self.spec.layers
    }

    pub fn origin(&self) -> RowOrigin {
        self.spec.origin
    }

    /// Spin counter; bumped by `begin_spin`
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn contains(&self, cell: CellPos) -> bool {
        cell.reel < self.spec.reels && cell.position < self.spec.rows && cell.layer < self.spec.layers
    }

    /// Visual row counted from the top for a logical position
    pub fn row_from_top(&self, position: usize) -> usize {
        match self.spec.origin {
            RowOrigin::TopDown => position,
            RowOrigin::BottomUp => self.spec.rows.saturating_sub(position + 1),
        }
    }

    fn index(&self, cell: CellPos) -> Option<usize> {
        self.contains(cell)
            .then(|| (cell.layer * self.spec.reels + cell.reel) * self.spec.rows + cell.position)
    }

    fn fresh_symbol(&mut self, name: &str) -> Symbol {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        Symbol {
            id,
            name: name.to_string(),
            transitions: 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a coordinate to the symbol entity currently there
    pub fn resolve(&self, cell: CellPos) -> BoardResult<SymbolRef> {
        let index = self.index(cell).ok_or_else(|| {
            BoardError::missing(
                cell,
                format!(
                    "outside {}x{}x{} grid",
                    self.spec.reels, self.spec.rows, self.spec.layers
                ),
            )
        })?;
        Ok(SymbolRef {
            cell,
            symbol: self.cells[index].id,
            epoch: self.epoch,
        })
    }

    /// Resolve on layer 0
    pub fn symbol_ref(&self, reel: usize, position: usize) -> BoardResult<SymbolRef> {
        self.resolve(CellPos::new(reel, position))
    }

    /// Check that a reference still names the entity in its cell
    pub fn check(&self, symbol_ref: &SymbolRef) -> BoardResult<usize> {
        let cell = symbol_ref.cell;
        if symbol_ref.epoch != self.epoch {
            return Err(BoardError::missing(
                cell,
                format!(
                    "reference from spin epoch {} used in epoch {}",
                    symbol_ref.epoch, self.epoch
                ),
            ));
        }
        let index = self
            .index(cell)
            .ok_or_else(|| BoardError::missing(cell, "outside grid"))?;
        if self.cells[index].id != symbol_ref.symbol {
            return Err(BoardError::missing(
                cell,
                format!("symbol {:?} no longer occupies the cell", symbol_ref.symbol),
            ));
        }
        Ok(index)
    }

    pub fn get(&self, symbol_ref: &SymbolRef) -> BoardResult<&Symbol> {
        let index = self.check(symbol_ref)?;
        Ok(&self.cells[index])
    }

    /// Symbol at a coordinate, without reference checks
    pub fn symbol_at(&self, cell: CellPos) -> Option<&Symbol> {
        self.index(cell).map(|index| &self.cells[index])
    }

    /// Symbol name at `(reel, position)` on layer 0
    pub fn name_at(&self, reel: usize, position: usize) -> Option<&str> {
        self.symbol_at(CellPos::new(reel, position))
            .map(|symbol| symbol.name.as_str())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the symbol behind `symbol_ref` with `name`
    ///
    /// Not guarded against repeats: a second call with the same target is
    /// legal and re-triggers the transition. Callers own "once per mutation".
    pub fn mutate_to(
        &mut self,
        symbol_ref: &SymbolRef,
        name: &str,
        opts: MutateOptions,
    ) -> BoardResult<SymbolChange> {
        let index = self.check(symbol_ref)?;
        let symbol = &mut self.cells[index];
        let from = std::mem::replace(&mut symbol.name, name.to_string());
        symbol.transitions += 1;

        let change = SymbolChange {
            cell: symbol_ref.cell,
            symbol: symbol.id,
            from,
            to: name.to_string(),
            skip_animation: opts.skip_animation,
            play_effect: opts.play_effect,
        };
        self.changes.push(change.clone());
        Ok(change)
    }

    /// Land new reel stops on layer 0
    ///
    /// `stops[reel][position]` in logical position order. Locked reels keep
    /// their symbols; every other cell gets a new entity, so references
    /// resolved before the stop no longer apply.
    pub fn load_stops(&mut self, stops: &[Vec<String>]) -> BoardResult<()> {
        let rows_ok = stops.iter().all(|reel| reel.len() == self.spec.rows);
        if stops.len() != self.spec.reels || !rows_ok {
            return Err(BoardError::ShapeMismatch {
                expected: format!("{} reels x {} rows", self.spec.reels, self.spec.rows),
                actual: format!(
                    "{} reels with rows {:?}",
                    stops.len(),
                    stops.iter().map(Vec::len).collect::<Vec<_>>()
                ),
            });
        }
        for (reel, names) in stops.iter().enumerate() {
            if self.locked.contains(&reel) {
                continue;
            }
            for (position, name) in names.iter().enumerate() {
                if let Some(index) = self.index(CellPos::new(reel, position)) {
                    self.cells[index] = self.fresh_symbol(name);
                }
            }
        }
        Ok(())
    }

    /// Start a new spin: old references go stale, locks and change log clear
    pub fn begin_spin(&mut self) {
        self.epoch += 1;
        self.locked.clear();
        self.changes.clear();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reel locks
    // ─────────────────────────────────────────────────────────────────────────

    pub fn lock_reel(&mut self, reel: usize) -> BoardResult<()> {
        if reel >= self.spec.reels {
            return Err(BoardError::missing(
                CellPos::new(reel, 0),
                format!("reel {} outside {} reels", reel, self.spec.reels),
            ));
        }
        self.locked.insert(reel);
        Ok(())
    }

    pub fn is_locked(&self, reel: usize) -> bool {
        self.locked.contains(&reel)
    }

    pub fn locked_reels(&self) -> Vec<usize> {
        self.locked.iter().copied().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    /// Changes recorded since the last `begin_spin`/`take_changes`
    pub fn changes(&self) -> &[SymbolChange] {
        &self.changes
    }

    pub fn take_changes(&mut self) -> Vec<SymbolChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        let layers = (0..self.spec.layers)
            .map(|layer| {
                (0..self.spec.reels)
                    .map(|reel| {
                        (0..self.spec.rows)
                            .filter_map(|position| {
                                self.symbol_at(CellPos::new(reel, position).on_layer(layer))
                                    .map(|symbol| symbol.name.clone())
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        GridSnapshot {
            layers,
            locked_reels: self.locked_reels(),
        }
    }

    /// Layer 0 as visual rows, top row first
    pub fn visual_rows(&self) -> Vec<Vec<String>> {
        let mut rows = vec![Vec::with_capacity(self.spec.reels); self.spec.rows];
        for position in 0..self.spec.rows {
            let row = self.row_from_top(position);
            for reel in 0..self.spec.reels {
                let name = self.name_at(reel, position).unwrap_or_default();
                rows[row].push(name.to_string());
            }
        }
        rows
    }
}
