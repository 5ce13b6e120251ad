use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub const COLS: usize = 10;
pub const ROWS: usize = 20;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
}

#[cfg(target_arch = "wasm32")]
fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

#[cfg(not(target_arch = "wasm32"))]
fn log(msg: &str) {
    eprintln!("{msg}");
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum PieceKind {
    I,
    J,
    L,
    O,
    S,
    Z,
    T,
}

impl PieceKind {
    pub fn all() -> [PieceKind; 7] {
        [
            PieceKind::I,
            PieceKind::J,
            PieceKind::L,
            PieceKind::O,
            PieceKind::S,
            PieceKind::Z,
            PieceKind::T,
        ]
    }

    // Cell tag written into the board; 0 is reserved for empty.
    fn color_id(self) -> u8 {
        match self {
            PieceKind::I => 1,
            PieceKind::J => 2,
            PieceKind::L => 3,
            PieceKind::O => 4,
            PieceKind::S => 5,
            PieceKind::Z => 6,
            PieceKind::T => 7,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Rotation {
    Spawn = 0,
    Right = 1,
    Reverse = 2,
    Left = 3,
}

impl Rotation {
    fn rotate_cw(self) -> Rotation {
        match self {
            Rotation::Spawn => Rotation::Right,
            Rotation::Right => Rotation::Reverse,
            Rotation::Reverse => Rotation::Left,
            Rotation::Left => Rotation::Spawn,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i8,
    pub y: i8,
}

// Clockwise rotation in row/column space (y grows downward).
fn rotate_point(p: Point, rot: Rotation) -> Point {
    match rot {
        Rotation::Spawn => p,
        Rotation::Right => Point { x: -p.y, y: p.x },
        Rotation::Reverse => Point { x: -p.x, y: -p.y },
        Rotation::Left => Point { x: p.y, y: -p.x },
    }
}

fn shape_blocks(kind: PieceKind, rotation: Rotation) -> [Point; 4] {
    // Offsets are relative to the piece anchor, rows growing downward.
    // I rotates inside its 4x4 box; O never moves; the rest derive from
    // one base shape through rotate_point.
    match kind {
        PieceKind::I => match rotation {
            Rotation::Spawn => [
                Point { x: -1, y: 0 },
                Point { x: 0, y: 0 },
                Point { x: 1, y: 0 },
                Point { x: 2, y: 0 },
            ],
            Rotation::Right => [
                Point { x: 1, y: -1 },
                Point { x: 1, y: 0 },
                Point { x: 1, y: 1 },
                Point { x: 1, y: 2 },
            ],
            Rotation::Reverse => [
                Point { x: -1, y: 1 },
                Point { x: 0, y: 1 },
                Point { x: 1, y: 1 },
                Point { x: 2, y: 1 },
            ],
            Rotation::Left => [
                Point { x: 0, y: -1 },
                Point { x: 0, y: 0 },
                Point { x: 0, y: 1 },
                Point { x: 0, y: 2 },
            ],
        },
        PieceKind::O => [
            Point { x: 0, y: -1 },
            Point { x: 1, y: -1 },
            Point { x: 0, y: 0 },
            Point { x: 1, y: 0 },
        ],
        _ => {
            let base = match kind {
                PieceKind::T => [
                    Point { x: -1, y: 0 },
                    Point { x: 0, y: 0 },
                    Point { x: 1, y: 0 },
                    Point { x: 0, y: -1 },
                ],
                PieceKind::J => [
                    Point { x: -1, y: 0 },
                    Point { x: 0, y: 0 },
                    Point { x: 1, y: 0 },
                    Point { x: -1, y: -1 },
                ],
                PieceKind::L => [
                    Point { x: -1, y: 0 },
                    Point { x: 0, y: 0 },
                    Point { x: 1, y: 0 },
                    Point { x: 1, y: -1 },
                ],
                PieceKind::S => [
                    Point { x: -1, y: 0 },
                    Point { x: 0, y: 0 },
                    Point { x: 0, y: -1 },
                    Point { x: 1, y: -1 },
                ],
                PieceKind::Z => [
                    Point { x: -1, y: -1 },
                    Point { x: 0, y: -1 },
                    Point { x: 0, y: 0 },
                    Point { x: 1, y: 0 },
                ],
                PieceKind::I | PieceKind::O => unreachable!(),
            };
            let mut rotated = [Point { x: 0, y: 0 }; 4];
            for (i, p) in base.iter().enumerate() {
                rotated[i] = rotate_point(*p, rotation);
            }
            rotated
        }
    }
}

#[derive(Clone, Copy)]
struct ActivePiece {
    kind: PieceKind,
    rotation: Rotation,
    row: i32,
    col: i32,
}

impl ActivePiece {
    fn new(kind: PieceKind) -> Self {
        Self {
            kind,
            rotation: Rotation::Spawn,
            // Anchor on the top row, centered; cells above row 0 sit in the
            // non-colliding spawn room and are simply not rendered.
            row: 0,
            col: 4,
        }
    }

    fn blocks(&self) -> [Point; 4] {
        shape_blocks(self.kind, self.rotation)
    }
}

#[derive(Clone)]
struct Board {
    cells: [[u8; COLS]; ROWS],
}

impl Board {
    fn new() -> Self {
        Self {
            cells: [[0; COLS]; ROWS],
        }
    }

    fn in_bounds(row: i32, col: i32) -> bool {
        (0..ROWS as i32).contains(&row) && (0..COLS as i32).contains(&col)
    }

    // Wall-aware occupancy: the side walls and the floor block, the spawn
    // room above the top row does not. Total over any i32 coordinate.
    fn blocks_at(&self, row: i32, col: i32) -> bool {
        if col < 0 || col >= COLS as i32 {
            return true;
        }
        if row >= ROWS as i32 {
            return true;
        }
        if row < 0 {
            return false;
        }
        self.cells[row as usize][col as usize] != 0
    }

    fn collides(&self, piece: &ActivePiece) -> bool {
        for b in piece.blocks() {
            if self.blocks_at(piece.row + b.y as i32, piece.col + b.x as i32) {
                return true;
            }
        }
        false
    }

    fn lock(&mut self, piece: &ActivePiece) {
        let tag = piece.kind.color_id();
        for b in piece.blocks() {
            let row = piece.row + b.y as i32;
            let col = piece.col + b.x as i32;
            if Self::in_bounds(row, col) {
                self.cells[row as usize][col as usize] = tag;
            }
        }
    }

    // Full-board scan, once per lock. Each complete row is removed, the
    // stack above it shifts down one, and a blank row appears at the top,
    // preserving the relative order of untouched rows.
    fn clear_complete_rows(&mut self) -> usize {
        let mut cleared = 0;
        for row in 0..ROWS {
            if self.cells[row].iter().all(|&c| c != 0) {
                cleared += 1;
                for pull in (1..=row).rev() {
                    self.cells[pull] = self.cells[pull - 1];
                }
                self.cells[0] = [0; COLS];
            }
        }
        cleared
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug)]
pub enum RandomizerKind {
    TrueRandom,
    SevenBag,
    SinglePiece { piece: PieceKind },
}

impl Default for RandomizerKind {
    fn default() -> Self {
        RandomizerKind::TrueRandom
    }
}

trait Randomizer {
    fn next(&mut self) -> PieceKind;
}

struct TrueRandom;

impl Randomizer for TrueRandom {
    fn next(&mut self) -> PieceKind {
        let mut rng = thread_rng();
        *PieceKind::all().choose(&mut rng).unwrap()
    }
}

struct SinglePiece {
    piece: PieceKind,
}

impl Randomizer for SinglePiece {
    fn next(&mut self) -> PieceKind {
        self.piece
    }
}

struct SevenBag {
    bag: Vec<PieceKind>,
}

impl SevenBag {
    fn new() -> Self {
        Self { bag: Vec::new() }
    }
}

impl Randomizer for SevenBag {
    fn next(&mut self) -> PieceKind {
        if self.bag.is_empty() {
            self.bag = PieceKind::all().to_vec();
            self.bag.shuffle(&mut thread_rng());
        }
        self.bag.pop().unwrap()
    }
}

fn randomizer_from_kind(kind: RandomizerKind) -> Box<dyn Randomizer> {
    match kind {
        RandomizerKind::TrueRandom => Box::new(TrueRandom),
        RandomizerKind::SevenBag => Box::new(SevenBag::new()),
        RandomizerKind::SinglePiece { piece } => Box::new(SinglePiece { piece }),
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct GameSettings {
    pub fall_ms: u32,
    pub fast_fall_ms: u32,
    pub ramp_interval_ms: u32,
    pub ramp_step_ms: u32,
    pub min_fall_ms: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            fall_ms: 500,
            fast_fall_ms: 10,
            ramp_interval_ms: 30_000,
            ramp_step_ms: 50,
            min_fall_ms: 100,
        }
    }
}

// Key map the presentation layer reads; the engine never sees raw keys.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ControlBindings {
    pub move_left: String,
    pub move_right: String,
    pub soft_drop: String,
    pub rotate: String,
    pub hard_drop: String,
    pub restart: String,
}

impl Default for ControlBindings {
    fn default() -> Self {
        Self {
            move_left: "ArrowLeft".to_string(),
            move_right: "ArrowRight".to_string(),
            soft_drop: "ArrowDown".to_string(),
            rotate: "ArrowUp".to_string(),
            hard_drop: "Space".to_string(),
            restart: "KeyR".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    MoveLeft,
    MoveRight,
    SoftDrop,
    Rotate,
    HardDrop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Running,
    GameOver,
}

#[derive(Serialize)]
pub struct FrameView {
    pub field: Vec<u8>,
    pub active: Vec<Point>,
    pub active_color: u8,
    pub score: u32,
    pub fall_ms: u32,
    pub game_over: bool,
}

pub struct Game {
    board: Board,
    active: ActivePiece,
    randomizer: Box<dyn Randomizer>,
    settings: GameSettings,
    state: SessionState,
    score: u32,
    fall_ms: u32,
    fall_accum: f32,
    ramp_accum: f32,
    fast_fall: bool,
}

impl Game {
    pub fn new(settings: GameSettings, randomizer_kind: RandomizerKind) -> Self {
        let mut randomizer = randomizer_from_kind(randomizer_kind);
        let first = randomizer.next();
        Self {
            board: Board::new(),
            active: ActivePiece::new(first),
            randomizer,
            state: SessionState::Running,
            score: 0,
            fall_ms: settings.fall_ms,
            fall_accum: 0.0,
            ramp_accum: 0.0,
            fast_fall: false,
            settings,
        }
    }

    // Reset everything and spawn the first piece; the scheduler and ramp
    // re-arm from zero on the next tick.
    pub fn start(&mut self) {
        self.board = Board::new();
        self.score = 0;
        self.fall_ms = self.settings.fall_ms;
        self.fall_accum = 0.0;
        self.ramp_accum = 0.0;
        self.fast_fall = false;
        self.state = SessionState::Running;
        let first = self.randomizer.next();
        self.active = ActivePiece::new(first);
    }

    pub fn restart(&mut self) {
        self.start();
    }

    pub fn is_over(&self) -> bool {
        self.state == SessionState::GameOver
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    // Commands are ignored outright once the session is over; illegal moves
    // are silent no-ops, not errors.
    pub fn handle(&mut self, cmd: Command) {
        if self.state == SessionState::GameOver {
            return;
        }
        match cmd {
            Command::MoveLeft => {
                self.try_shift(-1);
            }
            Command::MoveRight => {
                self.try_shift(1);
            }
            Command::SoftDrop => self.gravity_step(),
            Command::Rotate => {
                self.try_rotate();
            }
            Command::HardDrop => self.hard_drop(),
        }
    }

    // Advance session time. Each elapsed fall period issues one gravity
    // step; the ramp shortens the period every ramp_interval_ms down to
    // min_fall_ms and re-arms so gravity streams never overlap.
    pub fn tick(&mut self, dt_ms: f32) {
        if self.state == SessionState::GameOver {
            return;
        }
        self.ramp_accum += dt_ms;
        while self.ramp_accum >= self.settings.ramp_interval_ms as f32 {
            self.ramp_accum -= self.settings.ramp_interval_ms as f32;
            self.fall_ms = self
                .fall_ms
                .saturating_sub(self.settings.ramp_step_ms)
                .max(self.settings.min_fall_ms);
            self.fall_accum = 0.0;
        }
        self.fall_accum += dt_ms;
        while self.state == SessionState::Running && self.fall_accum >= self.period() as f32 {
            self.fall_accum -= self.period() as f32;
            self.gravity_step();
        }
    }

    fn period(&self) -> u32 {
        if self.fast_fall {
            self.settings.fast_fall_ms
        } else {
            self.fall_ms
        }
    }

    fn try_shift(&mut self, dir: i32) -> bool {
        let test = ActivePiece {
            col: self.active.col + dir,
            ..self.active
        };
        if self.board.collides(&test) {
            return false;
        }
        self.active = test;
        true
    }

    fn try_rotate(&mut self) -> bool {
        let test = ActivePiece {
            rotation: self.active.rotation.rotate_cw(),
            ..self.active
        };
        if self.board.collides(&test) {
            // No kick attempts; the piece keeps its prior pose.
            return false;
        }
        self.active = test;
        true
    }

    // The one place lock decisions are made: a piece locks exactly when its
    // downward step is illegal, never because of where its anchor sits.
    fn gravity_step(&mut self) {
        let test = ActivePiece {
            row: self.active.row + 1,
            ..self.active
        };
        if self.board.collides(&test) {
            self.lock_active();
        } else {
            self.active = test;
        }
    }

    fn hard_drop(&mut self) {
        // Collapse the fall period until the next lock; the piece still
        // descends through the normal gravity path.
        self.fast_fall = true;
        self.fall_accum = 0.0;
    }

    fn lock_active(&mut self) {
        self.board.lock(&self.active);
        let cleared = self.board.clear_complete_rows();
        self.score += cleared as u32;
        self.spawn_next();
    }

    fn spawn_next(&mut self) {
        self.fast_fall = false;
        self.fall_accum = 0.0;
        let next = self.randomizer.next();
        self.active = ActivePiece::new(next);
        if self.board.collides(&self.active) {
            self.state = SessionState::GameOver;
            log("game over: spawn blocked");
        }
    }

    pub fn frame(&self) -> FrameView {
        let mut field = Vec::with_capacity(COLS * ROWS);
        for row in 0..ROWS {
            for col in 0..COLS {
                field.push(self.board.cells[row][col]);
            }
        }
        let active = self
            .active
            .blocks()
            .iter()
            .filter_map(|b| {
                let row = self.active.row + b.y as i32;
                if (0..ROWS as i32).contains(&row) {
                    Some(Point {
                        x: self.active.col as i8 + b.x,
                        y: row as i8,
                    })
                } else {
                    None
                }
            })
            .collect();
        FrameView {
            field,
            active,
            active_color: self.active.kind.color_id(),
            score: self.score,
            fall_ms: self.fall_ms,
            game_over: self.is_over(),
        }
    }
}

#[wasm_bindgen]
pub struct GameClient {
    game: Game,
    on_frame: Option<js_sys::Function>,
}

#[wasm_bindgen]
impl GameClient {
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue, randomizer: JsValue) -> Result<GameClient, JsValue> {
        let settings: GameSettings = from_value(settings).unwrap_or_default();
        let randomizer: RandomizerKind = from_value(randomizer).unwrap_or_default();
        Ok(Self {
            game: Game::new(settings, randomizer),
            on_frame: None,
        })
    }

    #[wasm_bindgen(js_name = setOnFrame)]
    pub fn set_on_frame(&mut self, callback: js_sys::Function) {
        self.on_frame = Some(callback);
    }

    #[wasm_bindgen(js_name = tick)]
    pub fn tick(&mut self, dt_ms: f32) -> Result<JsValue, JsValue> {
        self.game.tick(dt_ms);
        self.emit_frame()
    }

    #[wasm_bindgen(js_name = moveLeft)]
    pub fn move_left(&mut self) -> Result<JsValue, JsValue> {
        self.command(Command::MoveLeft)
    }

    #[wasm_bindgen(js_name = moveRight)]
    pub fn move_right(&mut self) -> Result<JsValue, JsValue> {
        self.command(Command::MoveRight)
    }

    #[wasm_bindgen(js_name = softDrop)]
    pub fn soft_drop(&mut self) -> Result<JsValue, JsValue> {
        self.command(Command::SoftDrop)
    }

    #[wasm_bindgen(js_name = rotate)]
    pub fn rotate(&mut self) -> Result<JsValue, JsValue> {
        self.command(Command::Rotate)
    }

    #[wasm_bindgen(js_name = hardDrop)]
    pub fn hard_drop(&mut self) -> Result<JsValue, JsValue> {
        self.command(Command::HardDrop)
    }

    #[wasm_bindgen(js_name = start)]
    pub fn start(&mut self) -> Result<JsValue, JsValue> {
        self.game.start();
        self.emit_frame()
    }

    #[wasm_bindgen(js_name = restart)]
    pub fn restart(&mut self) -> Result<JsValue, JsValue> {
        self.game.restart();
        log("session restarted");
        self.emit_frame()
    }

    #[wasm_bindgen(js_name = isOver)]
    pub fn is_over(&self) -> bool {
        self.game.is_over()
    }

    #[wasm_bindgen(js_name = score)]
    pub fn score(&self) -> u32 {
        self.game.score()
    }

    #[wasm_bindgen(js_name = frame)]
    pub fn frame(&self) -> Result<JsValue, JsValue> {
        to_value(&self.game.frame()).map_err(|e| e.into())
    }

    #[wasm_bindgen(js_name = frameJson)]
    pub fn frame_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.game.frame()).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = boardSnapshot)]
    pub fn board_snapshot(&self) -> Vec<u8> {
        self.game.frame().field
    }

    #[wasm_bindgen(js_name = activePieceCells)]
    pub fn active_piece_cells(&self) -> Result<JsValue, JsValue> {
        to_value(&self.game.frame().active).map_err(|e| e.into())
    }

    #[wasm_bindgen(js_name = defaultBindings)]
    pub fn default_bindings() -> Result<JsValue, JsValue> {
        to_value(&ControlBindings::default()).map_err(|e| e.into())
    }
}

impl GameClient {
    fn command(&mut self, cmd: Command) -> Result<JsValue, JsValue> {
        self.game.handle(cmd);
        self.emit_frame()
    }

    // Every mutating entry point ends here, so the observer sees each
    // board or active-piece change without knowing about timers or input.
    fn emit_frame(&self) -> Result<JsValue, JsValue> {
        let frame = to_value(&self.game.frame()).map_err(JsValue::from)?;
        if let Some(cb) = &self.on_frame {
            cb.call1(&JsValue::NULL, &frame)?;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort_points(mut pts: Vec<Point>) -> Vec<Point> {
        pts.sort_by_key(|p| (p.x, p.y));
        pts
    }

    fn single_piece_game(kind: PieceKind) -> Game {
        Game::new(
            GameSettings::default(),
            RandomizerKind::SinglePiece { piece: kind },
        )
    }

    fn absolute_cells(game: &Game) -> Vec<(i32, i32)> {
        let mut cells: Vec<(i32, i32)> = game
            .active
            .blocks()
            .iter()
            .map(|b| (game.active.row + b.y as i32, game.active.col + b.x as i32))
            .collect();
        cells.sort();
        cells
    }

    fn occupied_count(board: &Board) -> usize {
        board
            .cells
            .iter()
            .flat_map(|row| row.iter())
            .filter(|&&c| c != 0)
            .count()
    }

    #[test]
    fn spawn_shapes_match_reference() {
        let expected = |kind, pts: &[(i8, i8)]| {
            assert_eq!(
                sort_points(shape_blocks(kind, Rotation::Spawn).to_vec()),
                sort_points(pts.iter().map(|&(x, y)| Point { x, y }).collect()),
                "{kind:?}"
            );
        };
        expected(PieceKind::I, &[(-1, 0), (0, 0), (1, 0), (2, 0)]);
        expected(PieceKind::O, &[(0, -1), (1, -1), (0, 0), (1, 0)]);
        expected(PieceKind::T, &[(-1, 0), (0, 0), (1, 0), (0, -1)]);
        expected(PieceKind::J, &[(-1, -1), (-1, 0), (0, 0), (1, 0)]);
        expected(PieceKind::L, &[(1, -1), (-1, 0), (0, 0), (1, 0)]);
        expected(PieceKind::S, &[(-1, 0), (0, 0), (0, -1), (1, -1)]);
        expected(PieceKind::Z, &[(-1, -1), (0, -1), (0, 0), (1, 0)]);
    }

    #[test]
    fn four_rotations_return_to_spawn_pose() {
        for kind in PieceKind::all() {
            let mut game = single_piece_game(kind);
            let start_cells = absolute_cells(&game);
            for _ in 0..4 {
                game.handle(Command::Rotate);
            }
            assert_eq!(game.active.rotation, Rotation::Spawn, "{kind:?}");
            assert_eq!(absolute_cells(&game), start_cells, "{kind:?}");
        }
    }

    #[test]
    fn walls_and_floor_block_but_spawn_room_does_not() {
        let mut board = Board::new();
        assert!(board.blocks_at(5, -1));
        assert!(board.blocks_at(5, COLS as i32));
        assert!(board.blocks_at(ROWS as i32, 5));
        assert!(!board.blocks_at(-1, 5));
        assert!(!board.blocks_at(5, 5));
        board.cells[5][5] = PieceKind::T.color_id();
        assert!(board.blocks_at(5, 5));
    }

    #[test]
    fn shift_into_wall_is_silently_ignored() {
        let mut game = single_piece_game(PieceKind::T);
        for _ in 0..COLS {
            game.handle(Command::MoveLeft);
        }
        // T spans col-1..col+1, so col 1 hugs the left wall.
        assert_eq!(game.active.col, 1);
        for _ in 0..COLS {
            game.handle(Command::MoveRight);
        }
        assert_eq!(game.active.col, COLS as i32 - 2);
    }

    #[test]
    fn rotation_blocked_by_wall_keeps_prior_pose() {
        let mut game = single_piece_game(PieceKind::I);
        // Vertical I hugging the left wall: its cells sit in column 0.
        game.handle(Command::Rotate);
        assert_eq!(game.active.rotation, Rotation::Right);
        for _ in 0..6 {
            game.handle(Command::MoveLeft);
        }
        assert_eq!(game.active.col, -1);
        let pose_before = absolute_cells(&game);
        game.handle(Command::Rotate);
        assert_eq!(game.active.rotation, Rotation::Right);
        assert_eq!(absolute_cells(&game), pose_before);
    }

    #[test]
    fn rotation_blocked_by_occupied_cell_keeps_prior_pose() {
        let mut game = single_piece_game(PieceKind::T);
        // The T nub swings into (1, 5) on a clockwise turn from row 1.
        game.active.row = 1;
        game.board.cells[1][5] = PieceKind::O.color_id();
        let pose_before = absolute_cells(&game);
        game.handle(Command::Rotate);
        assert_eq!(game.active.rotation, Rotation::Spawn);
        assert_eq!(absolute_cells(&game), pose_before);
    }

    #[test]
    fn clearing_nothing_returns_zero_and_changes_nothing() {
        let mut board = Board::new();
        board.cells[19][0] = 1;
        board.cells[10][9] = 2;
        let before = board.cells;
        assert_eq!(board.clear_complete_rows(), 0);
        assert_eq!(board.cells, before);
    }

    #[test]
    fn clearing_rows_shifts_stack_down_in_order() {
        let mut board = Board::new();
        board.cells[18] = [1; COLS];
        board.cells[19] = [2; COLS];
        board.cells[16][3] = 7;
        board.cells[17][5] = 4;
        assert_eq!(board.clear_complete_rows(), 2);
        // The two untouched rows drop by two, keeping their order.
        assert_eq!(board.cells[18][3], 7);
        assert_eq!(board.cells[19][5], 4);
        assert_eq!(occupied_count(&board), 2);
        assert!(board.cells[0].iter().all(|&c| c == 0));
        assert!(board.cells[1].iter().all(|&c| c == 0));
    }

    #[test]
    fn soft_drop_to_bottom_locks_exactly_once() {
        let mut game = single_piece_game(PieceKind::T);
        while occupied_count(&game.board) == 0 {
            game.handle(Command::SoftDrop);
        }
        assert_eq!(occupied_count(&game.board), 4);
        assert_eq!(game.score(), 0);
        assert!(!game.is_over());
        // The replacement piece is back at the spawn anchor.
        assert_eq!(game.active.row, 0);
        assert_eq!(game.active.col, 4);
    }

    #[test]
    fn completing_a_row_scores_one_and_prepends_a_blank_row() {
        let mut game = single_piece_game(PieceKind::I);
        for col in [0, 1, 2, 7, 8, 9] {
            game.board.cells[19][col] = PieceKind::O.color_id();
        }
        game.board.cells[18][0] = PieceKind::Z.color_id();
        while game.score() == 0 {
            game.handle(Command::SoftDrop);
        }
        assert_eq!(game.score(), 1);
        // Only the marker survives, shifted down onto the bottom row.
        assert_eq!(occupied_count(&game.board), 1);
        assert_eq!(game.board.cells[19][0], PieceKind::Z.color_id());
    }

    #[test]
    fn piece_on_top_row_locks_when_blocked_below() {
        let mut game = single_piece_game(PieceKind::T);
        for col in [3, 4, 5] {
            game.board.cells[1][col] = PieceKind::O.color_id();
        }
        // Current cells on row 0 are legal; only the downward step fails.
        assert!(!game.board.collides(&game.active));
        game.handle(Command::SoftDrop);
        assert_eq!(game.board.cells[0][4], PieceKind::T.color_id());
        // The fresh spawn lands on those locked cells: session over.
        assert!(game.is_over());
    }

    #[test]
    fn game_over_ignores_commands_until_restart() {
        let mut game = single_piece_game(PieceKind::O);
        game.board.cells[0][4] = 1;
        game.spawn_next();
        assert!(game.is_over());

        let pose = absolute_cells(&game);
        let cells = occupied_count(&game.board);
        for cmd in [
            Command::MoveLeft,
            Command::MoveRight,
            Command::SoftDrop,
            Command::Rotate,
            Command::HardDrop,
        ] {
            game.handle(cmd);
        }
        game.tick(10_000.0);
        assert_eq!(absolute_cells(&game), pose);
        assert_eq!(occupied_count(&game.board), cells);

        game.restart();
        assert!(!game.is_over());
        assert_eq!(game.score(), 0);
        assert_eq!(occupied_count(&game.board), 0);
        assert_eq!(game.fall_ms, 500);
    }

    #[test]
    fn fall_period_ramps_down_to_the_floor() {
        let mut game = single_piece_game(PieceKind::O);
        game.tick(30_000.0);
        assert_eq!(game.fall_ms, 450);
        assert!(!game.is_over());
        // Keep the well clear so the ramp, not the stack, is what's measured.
        for _ in 0..12 {
            game.board = Board::new();
            game.active = ActivePiece::new(PieceKind::O);
            game.state = SessionState::Running;
            game.tick(30_000.0);
        }
        assert_eq!(game.fall_ms, game.settings.min_fall_ms);
    }

    #[test]
    fn gravity_steps_once_per_elapsed_period() {
        let mut game = single_piece_game(PieceKind::T);
        game.tick(499.0);
        assert_eq!(game.active.row, 0);
        game.tick(1.0);
        assert_eq!(game.active.row, 1);
        game.tick(1_000.0);
        assert_eq!(game.active.row, 3);
    }

    #[test]
    fn hard_drop_accelerates_until_lock_then_rearms() {
        let mut game = single_piece_game(PieceKind::T);
        game.handle(Command::HardDrop);
        // 200ms is under one normal period but twenty fast-fall periods.
        game.tick(200.0);
        assert_eq!(occupied_count(&game.board), 4);
        assert_eq!(game.score(), 0);
        assert!(!game.fast_fall);
        assert_eq!(game.active.row, 0);
        // Back at the session period: a fast-fall interval no longer steps.
        game.tick(10.0);
        assert_eq!(game.active.row, 0);
    }

    #[test]
    fn seven_bag_deals_each_kind_once_per_bag() {
        let mut bag = SevenBag::new();
        let mut dealt: Vec<PieceKind> = (0..7).map(|_| bag.next()).collect();
        dealt.sort_by_key(|k| k.color_id());
        let mut all = PieceKind::all().to_vec();
        all.sort_by_key(|k| k.color_id());
        assert_eq!(dealt, all);
    }

    #[test]
    fn frame_reports_visible_cells_only() {
        let game = single_piece_game(PieceKind::T);
        let frame = game.frame();
        assert!(frame.field.iter().all(|&c| c == 0));
        // The T nub sits above row 0 at spawn and is not rendered.
        assert_eq!(
            sort_points(frame.active),
            sort_points(vec![
                Point { x: 3, y: 0 },
                Point { x: 4, y: 0 },
                Point { x: 5, y: 0 },
            ])
        );
        assert_eq!(frame.active_color, PieceKind::T.color_id());
        assert_eq!(frame.score, 0);
        assert_eq!(frame.fall_ms, 500);
        assert!(!frame.game_over);
    }
}
