// Destructible pixel terrain for the playfield.
//
// The terrain is stored as a flat `Vec<bool>` indexed by `x + y * width`,
// one byte per pixel, giving O(1) solid queries. Every mutation writes the
// grid in place, so a query issued right after a mutation (same tick,
// same lemming) always sees the new state. There is no deferred cache.
// Out-of-bounds reads are empty; out-of-bounds writes are clipped.
//
// Alongside the grid the terrain keeps the ordered list of pieces that were
// added (`TerrainPiece`), which renderers paint with per-kind patterns, and
// the optional entry and exit anchors. Erase operators only touch the grid;
// pieces are a build log, not a collision source.
//
// Mutation operators map to lemming abilities:
// - `erase_circle`: digger and explosion.
// - `erase_rect`: basher (rectangle centred vertically on `y`).
// - `erase_diagonal`: miner (triangular wedge).
// - `add_bridge`: builder.
//
// Coordinates are `f32` playfield pixels. Cell `(i, j)` covers
// `[i, i+1) x [j, j+1)`; point queries floor their inputs, erase operators
// test cell centres, and additive operators round edges with `round_px`.
//
// See also: `lemming.rs` for the state machine that queries and mutates the
// terrain, `level.rs` for the level-file operations that build it,
// `config.rs` for `ExitSensor`.

use crate::config::ExitSensor;
use crate::types::{Direction, PieceKind, PixelPoint, round_px};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A terrain piece as added, after rounding. Used only for rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainPiece {
    pub kind: PieceKind,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Dense solid/empty pixel grid plus its visual piece list.
#[derive(Clone, Debug)]
pub struct Terrain {
    /// Flat storage: index = x + y * width.
    cells: Vec<bool>,
    width: u32,
    height: u32,
    pieces: Vec<TerrainPiece>,
    entry: Option<PixelPoint>,
    exit: Option<PixelPoint>,
    exit_sensor: ExitSensor,
}

impl Terrain {
    /// Create an empty terrain of the given size.
    pub fn new(width: u32, height: u32, exit_sensor: ExitSensor) -> Self {
        Self {
            cells: vec![false; (width as usize) * (height as usize)],
            width,
            height,
            pieces: Vec::new(),
            entry: None,
            exit: None,
            exit_sensor,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pieces(&self) -> &[TerrainPiece] {
        &self.pieces
    }

    pub fn entry(&self) -> Option<PixelPoint> {
        self.entry
    }

    pub fn exit(&self) -> Option<PixelPoint> {
        self.exit
    }

    /// The raw grid, row-major, for renderers that want the carved shape.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Number of solid pixels.
    pub fn solid_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Reset to an empty field with no pieces and no anchors.
    pub fn clear(&mut self) {
        self.cells.fill(false);
        self.pieces.clear();
        self.entry = None;
        self.exit = None;
    }

    /// Mark a rectangle solid and record it as a piece. Edges are rounded to
    /// whole pixels; negative sizes extend left/up from the anchor; anything
    /// outside the field is clipped.
    pub fn add_rect(&mut self, x: f32, y: f32, w: f32, h: f32, kind: PieceKind) {
        let (x, y, w, h) = (round_px(x), round_px(y), round_px(w), round_px(h));
        self.pieces.push(TerrainPiece { kind, x, y, w, h });

        let (x0, x1) = if w < 0 { (x + w, x) } else { (x, x + w) };
        let (y0, y1) = if h < 0 { (y + h, y) } else { (y, y + h) };
        self.fill_cells(x0, y0, x1, y1, true);
        trace!(?kind, x, y, w, h, "terrain rect added");
    }

    /// A builder's bridge segment.
    pub fn add_bridge(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.add_rect(x, y, w, h, PieceKind::Bridge);
    }

    pub fn set_entry(&mut self, x: f32, y: f32) {
        self.entry = Some(PixelPoint::new(round_px(x), round_px(y)));
    }

    pub fn set_exit(&mut self, x: f32, y: f32) {
        self.exit = Some(PixelPoint::new(round_px(x), round_px(y)));
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(x as usize + y as usize * self.width as usize)
    }

    /// Solid test for an integer cell. Out of bounds is empty.
    pub fn cell_is_solid(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some_and(|i| self.cells[i])
    }

    /// Solid test for a playfield point (floored to its cell).
    pub fn point_is_solid(&self, x: f32, y: f32) -> bool {
        self.cell_is_solid(x.floor() as i32, y.floor() as i32)
    }

    /// Coarse rectangle test: the four corners and the centre.
    pub fn rect_is_solid(&self, x: f32, y: f32, w: f32, h: f32) -> bool {
        self.point_is_solid(x, y)
            || self.point_is_solid(x + w, y)
            || self.point_is_solid(x, y + h)
            || self.point_is_solid(x + w, y + h)
            || self.point_is_solid(x + w / 2.0, y + h / 2.0)
    }

    /// Scan down from `(x, y)` for at most `max_distance` further rows,
    /// testing columns `x-1..=x+1` on each row. Returns the row just above
    /// the first solid hit, or `None` if nothing solid is in range.
    ///
    /// The three-column band keeps lemmings from slipping through bridge
    /// edges that sit one pixel off their centre line.
    pub fn find_floor_below(&self, x: f32, y: f32, max_distance: u32) -> Option<i32> {
        let ix = x.floor() as i32;
        let start = y.floor() as i32;
        let end = start
            .saturating_add(max_distance as i32)
            .min(self.height as i32 - 1);
        (start.max(0)..=end)
            .find(|&row| (ix - 1..=ix + 1).any(|col| self.cell_is_solid(col, row)))
            .map(|row| row - 1)
    }

    /// Whether `(x, y)` lies inside the exit sensor window (inclusive).
    pub fn exit_contains(&self, x: f32, y: f32) -> bool {
        let Some(exit) = self.exit else {
            return false;
        };
        let (ex, ey) = (exit.x as f32, exit.y as f32);
        let s = &self.exit_sensor;
        x >= ex + s.left && x <= ex + s.right && y >= ey + s.top && y <= ey + s.bottom
    }

    // -----------------------------------------------------------------------
    // Erase operators
    // -----------------------------------------------------------------------

    /// Clear every cell whose centre lies within `radius` of `(cx, cy)`.
    pub fn erase_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        if radius < 0.0 {
            return;
        }
        let r2 = radius * radius;
        let (x0, x1) = ((cx - radius).floor() as i32, (cx + radius).ceil() as i32);
        let (y0, y1) = ((cy - radius).floor() as i32, (cy + radius).ceil() as i32);
        for j in y0.max(0)..=y1.min(self.height as i32 - 1) {
            let dy = j as f32 + 0.5 - cy;
            for i in x0.max(0)..=x1.min(self.width as i32 - 1) {
                let dx = i as f32 + 0.5 - cx;
                if dx * dx + dy * dy <= r2 {
                    self.set_cell(i, j, false);
                }
            }
        }
        trace!(cx, cy, radius, "terrain circle erased");
    }

    /// Clear a `w` x `h` rectangle whose left edge is `x` and whose vertical
    /// centre is `y`.
    pub fn erase_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let top = y - h / 2.0;
        let (x0, x1) = (round_px(x.min(x + w)), round_px(x.max(x + w)));
        let (y0, y1) = (round_px(top.min(top + h)), round_px(top.max(top + h)));
        self.fill_cells(x0, y0, x1, y1, false);
        trace!(x, y, w, h, "terrain rect erased");
    }

    /// Clear a right-triangle wedge. The triangle's vertices are the near-top
    /// corner `(x, y - h/2)`, the far-top corner `(x + dir*w, y - h/2)` and
    /// the far-bottom corner `(x + dir*w, y + h/2)`, so its hypotenuse runs
    /// from the near-top to the far-bottom corner.
    pub fn erase_diagonal(&mut self, x: f32, y: f32, w: f32, h: f32, dir: Direction) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let sign = dir.sign();
        let top = y - h / 2.0;
        let (left, right) = if sign > 0.0 { (x, x + w) } else { (x - w, x) };
        let (x0, x1) = (left.floor() as i32, right.ceil() as i32);
        let (y0, y1) = (top.floor() as i32, (top + h).ceil() as i32);
        for j in y0.max(0)..=y1.min(self.height as i32 - 1) {
            let v = j as f32 + 0.5 - top;
            if v < 0.0 || v > h {
                continue;
            }
            for i in x0.max(0)..=x1.min(self.width as i32 - 1) {
                let u = (i as f32 + 0.5 - x) * sign;
                if (0.0..=w).contains(&u) && v <= h * u / w {
                    self.set_cell(i, j, false);
                }
            }
        }
        trace!(x, y, w, h, ?dir, "terrain wedge erased");
    }

    // -----------------------------------------------------------------------
    // Cell writes
    // -----------------------------------------------------------------------

    fn set_cell(&mut self, x: i32, y: i32, solid: bool) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = solid;
        }
    }

    /// Fill the half-open cell range `[x0, x1) x [y0, y1)`, clipped.
    fn fill_cells(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, solid: bool) {
        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(self.width as i32);
        let y1 = y1.min(self.height as i32);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let stride = self.width as usize;
        for row in y0 as usize..y1 as usize {
            let base = row * stride;
            self.cells[base + x0 as usize..base + x1 as usize].fill(solid);
        }
    }
}
