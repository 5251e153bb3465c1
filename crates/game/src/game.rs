//! Game module - one match
//!
//! A [`Game`] owns the roster and the lifecycle flags behind one mutex. Each
//! player's boards sit behind their own mutexes; the game lock is always
//! taken first. Background loops lock, mutate, unlock and only then touch
//! channels, and no lock is ever held across an `.await`.
//!
//! The same type runs on both ends. The host (`local_player == PLAYER_HOST`)
//! mirrors every board, distributes garbage and decides when the match is
//! over. A client simulates its own board, sends snapshots upstream and
//! mirrors everyone else.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use netris_core::{generate, Bag, Matrix, MatrixEvent, MinoError, Mino, SharedMatrix};

use crate::conn::{ConnHandle, InboundCommand};
use crate::event::GameEvent;
use crate::lock;
use crate::player::{sanitize_nickname, Player, ANONYMOUS};
use crate::protocol::{
    create_message, create_roster, Command, GameOver, JoinGame, Nickname, ReceiveGarbage,
    SendGarbage, StartGame, UpdateGame, UpdateMatrix,
};
use crate::types::{
    Direction, GameAction, PlayerId, BOARD_WIDTH, FALL_TIME_MS, GARBAGE_INTERVAL_MS,
    LOCK_WATCHDOG_MS, PLAYER_HOST, PLAYER_UNKNOWN, RESTART_DELAY_SECS, UPDATE_DURATION_MS,
};

/// Winner name when nobody survives
pub const TIE: &str = "Tie!";

/// Clock source shared with tokio so paused-time tests drive the simulation.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn clock_seed() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(1)
        .max(1)
}

#[derive(Debug)]
pub struct GameState {
    pub seed: i64,
    pub players: BTreeMap<PlayerId, Player>,
    next_player: PlayerId,

    pub starting: bool,
    pub started: bool,
    pub game_over: bool,
    sent_game_over_matrix: bool,
    pub terminated: bool,
    /// Private practice match; never declares a winner
    pub local: bool,

    loops_running: bool,
}

impl GameState {
    fn new() -> Self {
        Self {
            seed: 0,
            players: BTreeMap::new(),
            next_player: 1,
            starting: false,
            started: false,
            game_over: false,
            sent_game_over_matrix: false,
            terminated: false,
            local: false,
            loops_running: false,
        }
    }

    fn roster(&self) -> Command {
        create_roster(self.players.iter().map(|(id, p)| (*id, p.name.as_str())))
    }
}

pub struct Game {
    id: i32,
    rank: i32,
    minos: Vec<Mino>,
    local_player: PlayerId,
    fall_time: Duration,

    out: Option<ConnHandle>,
    messages: Option<mpsc::UnboundedSender<String>>,

    events_tx: mpsc::UnboundedSender<GameEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<GameEvent>>>,
    fall_reset: Notify,
    shutdown: watch::Sender<bool>,

    state: Mutex<GameState>,
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.id)
            .field("rank", &self.rank)
            .field("local_player", &self.local_player)
            .finish_non_exhaustive()
    }
}

impl Game {
    fn build(
        id: i32,
        rank: i32,
        local_player: PlayerId,
        out: Option<ConnHandle>,
        messages: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<Arc<Self>, MinoError> {
        let minos = generate(rank)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Ok(Arc::new(Self {
            id,
            rank,
            minos,
            local_player,
            fall_time: Duration::from_millis(FALL_TIME_MS),
            out,
            messages,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            fall_reset: Notify::new(),
            shutdown,
            state: Mutex::new(GameState::new()),
        }))
    }

    /// Authoritative match on the server
    pub fn new_host(
        id: i32,
        rank: i32,
        messages: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<Arc<Self>, MinoError> {
        Self::build(id, rank, PLAYER_HOST, None, messages)
    }

    /// Client-side match for `local_player`, sending upstream through `out`
    pub fn new_client(
        rank: i32,
        local_player: PlayerId,
        out: ConnHandle,
        messages: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<Arc<Self>, MinoError> {
        Self::build(0, rank, local_player, Some(out), messages)
    }

    fn lock(&self) -> MutexGuard<'_, GameState> {
        lock(&self.state)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn local_player(&self) -> PlayerId {
        self.local_player
    }

    pub fn is_host(&self) -> bool {
        self.local_player == PLAYER_HOST
    }

    pub fn seed(&self) -> i64 {
        self.lock().seed
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_game_over(&self) -> bool {
        self.lock().game_over
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    pub fn is_local(&self) -> bool {
        self.lock().local
    }

    pub fn set_local(&self, local: bool) {
        self.lock().local = local;
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.lock().players.keys().copied().collect()
    }

    pub fn player_name(&self, id: PlayerId) -> Option<String> {
        self.lock().players.get(&id).map(|p| p.name.clone())
    }

    pub fn score(&self, id: PlayerId) -> Option<u32> {
        self.lock().players.get(&id).map(|p| p.score)
    }

    /// (sent, received, pending) garbage totals for the round
    pub fn garbage_stats(&self, id: PlayerId) -> Option<(u32, u32, u32)> {
        self.lock().players.get(&id).map(|p| {
            (
                p.garbage_sent(),
                p.garbage_received(),
                p.pending_garbage(),
            )
        })
    }

    pub fn matrix(&self, id: PlayerId) -> Option<SharedMatrix> {
        self.lock().players.get(&id).map(|p| Arc::clone(&p.matrix))
    }

    pub fn preview(&self, id: PlayerId) -> Option<SharedMatrix> {
        self.lock().players.get(&id).map(|p| Arc::clone(&p.preview))
    }

    /// Log a user-visible line and forward it to the message sink.
    fn log_message(&self, message: impl Into<String>) {
        let message = message.into();
        info!(game = self.id, "{}", message);
        if let Some(tx) = &self.messages {
            let _ = tx.send(message);
        }
    }

    fn out(&self, command: Command) {
        if let Some(out) = &self.out {
            out.write(command);
        }
    }

    fn write_all_locked(&self, st: &GameState, command: Command) {
        for player in st.players.values() {
            player.write(command.clone());
        }
    }

    fn write_message_locked(&self, st: &GameState, message: impl Into<String>) {
        let message = message.into();
        self.log_message(message.clone());
        self.write_all_locked(st, create_message(PLAYER_HOST, message));
    }

    /// System message to every player
    pub fn write_message(&self, message: impl Into<String>) {
        let st = self.lock();
        self.write_message_locked(&st, message);
    }

    pub fn write_to(&self, id: PlayerId, command: Command) {
        if let Some(player) = self.lock().players.get(&id) {
            player.write(command);
        }
    }

    // ============== Roster ==============

    pub fn add_player(&self, player: Player) -> PlayerId {
        let mut st = self.lock();
        self.add_player_locked(&mut st, player)
    }

    fn add_player_locked(&self, st: &mut GameState, mut player: Player) -> PlayerId {
        if player.id == PLAYER_UNKNOWN {
            player.id = st.next_player;
            st.next_player += 1;
        }
        let id = player.id;
        if let Some(conn) = player.conn() {
            conn.set_player(id);
        }

        let mut preview = Matrix::preview(self.rank);
        preview.player_name = player.name.clone();
        let mut matrix = Matrix::standard();
        matrix.player_name = player.name.clone();
        if st.started {
            matrix.mark_game_over();
        }
        player.preview = preview.shared();
        player.matrix = matrix.shared();

        let name = player.name.clone();
        st.players.insert(id, player);
        debug!(game = self.id, player = id, name = %name, "player added");

        if self.is_host() {
            if let Some(player) = st.players.get(&id) {
                player.write(Command::JoinGame(JoinGame {
                    player_id: id,
                    ..Default::default()
                }));
            }
            self.write_all_locked(st, st.roster());
            if st.started {
                if let Some(player) = st.players.get(&id) {
                    player.write(Command::StartGame(StartGame {
                        seed: st.seed,
                        started: true,
                    }));
                }
            }
            if st.players.len() > 1 {
                self.write_message_locked(st, format!("{} has joined the game", name));
            }
        }
        id
    }

    pub fn remove_player(&self, id: PlayerId) {
        let mut st = self.lock();
        self.remove_player_locked(&mut st, id);
    }

    fn remove_player_locked(&self, st: &mut GameState, id: PlayerId) {
        if id < 0 {
            return;
        }
        let Some(player) = st.players.remove(&id) else {
            return;
        };
        debug!(game = self.id, player = id, "player removed");

        if self.is_host() {
            if st.players.is_empty() {
                self.stop_locked(st);
                return;
            }
            self.write_all_locked(st, st.roster());
            self.write_message_locked(st, format!("{} has left the game", player.name));
        }
    }

    /// Sync the roster with a host snapshot: rename, add missing, drop absent.
    pub fn process_update_game(&self, update: &UpdateGame) {
        let mut st = self.lock();
        self.process_update_game_locked(&mut st, update);
    }

    fn process_update_game_locked(&self, st: &mut GameState, update: &UpdateGame) {
        for (&id, name) in &update.players {
            match st.players.get_mut(&id) {
                Some(existing) => existing.name = name.clone(),
                None => {
                    let mut player = Player::new(name, None);
                    player.id = id;
                    self.add_player_locked(st, player);
                }
            }
        }

        let absent: Vec<PlayerId> = st
            .players
            .keys()
            .filter(|id| !update.players.contains_key(id))
            .copied()
            .collect();
        for id in absent {
            self.remove_player_locked(st, id);
        }
    }

    // ============== Lifecycle ==============

    /// Start the round. Returns the seed in use; a running or finished round keeps its seed.
    pub fn start(self: &Arc<Self>, seed: i64) -> i64 {
        let mut st = self.lock();
        self.start_locked(&mut st, seed)
    }

    fn start_locked(self: &Arc<Self>, st: &mut GameState, seed: i64) -> i64 {
        if st.game_over || st.started || st.terminated {
            return st.seed;
        }
        st.started = true;
        st.starting = false;

        let seed = if seed == 0 { clock_seed() } else { seed };
        st.seed = seed;

        for player in st.players.values() {
            let bag = Arc::new(Bag::new(seed, &self.minos, BOARD_WIDTH));
            lock(&player.preview).attach_bag(Arc::clone(&bag));
            lock(&player.matrix).attach_bag(bag);
        }

        for (id, player) in &st.players {
            {
                let mut matrix = lock(&player.matrix);
                if !matrix.take_piece() {
                    debug!(game = self.id, player = id, "no piece taken at start");
                }
                matrix.draw_pieces();
            }
            if let Err(e) = lock(&player.preview).show_next() {
                debug!(game = self.id, player = id, error = %e, "preview not drawn");
            }
        }

        if !st.loops_running {
            st.loops_running = true;
            self.spawn_event_handler();
            if self.is_host() {
                self.spawn_ticker(Duration::from_millis(UPDATE_DURATION_MS), Game::distribute_matrixes_tick);
                self.spawn_ticker(Duration::from_millis(GARBAGE_INTERVAL_MS), Game::distribute_garbage_tick);
            } else {
                self.spawn_fall_loop();
                self.spawn_ticker(Duration::from_millis(GARBAGE_INTERVAL_MS), Game::receive_garbage_tick);
                self.spawn_ticker(Duration::from_millis(UPDATE_DURATION_MS), Game::send_matrix_tick);
                self.spawn_ticker(Duration::from_millis(LOCK_WATCHDOG_MS), Game::settle_tick);
            }
        }

        if self.is_host() {
            self.write_all_locked(
                st,
                Command::StartGame(StartGame {
                    seed,
                    started: false,
                }),
            );
        }

        info!(game = self.id, seed, players = st.players.len(), "starting game");
        seed
    }

    /// Clear every board and flag for a rematch.
    pub fn reset(&self) {
        let mut st = self.lock();
        self.reset_locked(&mut st);
    }

    fn reset_locked(&self, st: &mut GameState) {
        debug!(game = self.id, "resetting");
        st.starting = false;
        st.started = false;
        st.game_over = false;
        st.sent_game_over_matrix = false;

        for player in st.players.values_mut() {
            player.total_garbage_sent = 0;
            player.total_garbage_received = 0;
            player.pending_garbage = 0;
            player.score = 0;
            lock(&player.preview).reset();
            lock(&player.matrix).reset();
        }

        if self.is_host() {
            self.write_all_locked(st, Command::JoinGame(JoinGame::default()));
        }
    }

    /// Mark the auto-start countdown as begun. False when already starting or started.
    pub fn begin_auto_start(&self) -> bool {
        let mut st = self.lock();
        if st.starting || st.started {
            return false;
        }
        st.starting = true;
        true
    }

    pub fn terminate(&self) {
        let mut st = self.lock();
        self.stop_locked(&mut st);
    }

    fn stop_locked(&self, st: &mut GameState) {
        if st.terminated {
            return;
        }
        st.players.clear();
        st.terminated = true;
        self.shutdown.send_replace(true);
        info!(game = self.id, "game terminated");
    }

    // ============== Local simulation ==============

    /// Run `step` on the local matrix and route its side effects.
    fn step_local(&self, st: &GameState, step: impl FnOnce(&mut Matrix, Instant)) {
        let Some(player) = st.players.get(&self.local_player) else {
            return;
        };
        let moved = {
            let mut matrix = lock(&player.matrix);
            step(&mut matrix, now());
            self.drain_matrix_events(self.local_player, &mut matrix)
        };
        if moved {
            if let Err(e) = lock(&player.preview).show_next() {
                debug!(game = self.id, error = %e, "preview not drawn");
            }
        }
    }

    fn drain_matrix_events(&self, player: PlayerId, matrix: &mut Matrix) -> bool {
        let mut moved = false;
        for event in matrix.take_events() {
            if event == MatrixEvent::Moved {
                moved = true;
            } else if let Some(event) = GameEvent::from_matrix(player, event) {
                let _ = self.events_tx.send(event);
            }
        }
        if moved {
            self.fall_reset.notify_one();
        }
        matrix.draw_pieces();
        moved
    }

    pub fn process_action(&self, action: GameAction) {
        let st = self.lock();
        self.step_local(&st, |matrix, now| match action {
            GameAction::RotateCcw => {
                matrix.rotate_piece(1, Direction::CounterClockwise, now);
            }
            GameAction::RotateCw => {
                matrix.rotate_piece(1, Direction::Clockwise, now);
            }
            GameAction::MoveLeft => {
                matrix.move_piece(-1, 0, now);
            }
            GameAction::MoveRight => {
                matrix.move_piece(1, 0, now);
            }
            GameAction::SoftDrop => {
                matrix.move_piece(0, -1, now);
            }
            GameAction::HardDrop => matrix.hard_drop_piece(now),
        });
    }

    /// Queue a chat line from the local player
    pub fn send_chat(&self, message: impl Into<String>) {
        let _ = self.events_tx.send(GameEvent::Message(message.into()));
    }

    /// Queue a nickname change for the local player
    pub fn change_nickname(&self, nickname: impl Into<String>) {
        let _ = self.events_tx.send(GameEvent::Nickname(nickname.into()));
    }

    // ============== Background loops ==============

    fn spawn_event_handler(self: &Arc<Self>) {
        let Some(mut rx) = lock(&self.events_rx).take() else {
            return;
        };
        let game = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.changed() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                game.handle_event(event);
            }
        });
    }

    fn handle_event(&self, event: GameEvent) {
        debug!(game = self.id, ?event, "game event");
        match event {
            GameEvent::Message(message) => self.out(create_message(PLAYER_UNKNOWN, message)),
            GameEvent::Nickname(nickname) => self.out(Command::Nickname(Nickname {
                player: PLAYER_UNKNOWN,
                nickname,
            })),
            GameEvent::GameOver => {
                {
                    let st = self.lock();
                    if let Some(player) = st.players.get(&self.local_player) {
                        lock(&player.matrix).set_game_over();
                    }
                }
                self.out(Command::GameOver(GameOver::default()));
            }
            GameEvent::SendGarbage(lines) => self.out(Command::SendGarbage(SendGarbage { lines })),
            GameEvent::Score { player, score } => {
                if let Some(player) = self.lock().players.get_mut(&player) {
                    player.score += score;
                }
            }
        }
    }

    fn spawn_ticker(self: &Arc<Self>, period: Duration, tick: fn(&Arc<Game>) -> ControlFlow<()>) {
        let game = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }
                if tick(&game).is_break() {
                    break;
                }
            }
        });
    }

    /// Gravity for the local board; any downward move restarts the interval.
    fn spawn_fall_loop(self: &Arc<Self>) {
        let game = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = game.fall_reset.notified() => continue,
                    _ = tokio::time::sleep(game.fall_time) => {}
                }
                if game.lower_tick().is_break() {
                    break;
                }
            }
        });
    }

    fn lower_tick(&self) -> ControlFlow<()> {
        let st = self.lock();
        if st.terminated {
            return ControlFlow::Break(());
        }
        if st.started {
            self.step_local(&st, |matrix, now| matrix.lower_piece(now));
        }
        ControlFlow::Continue(())
    }

    fn settle_tick(game: &Arc<Game>) -> ControlFlow<()> {
        let st = game.lock();
        if st.terminated {
            return ControlFlow::Break(());
        }
        if st.started {
            game.step_local(&st, |matrix, now| {
                matrix.settle(now);
            });
        }
        ControlFlow::Continue(())
    }

    fn receive_garbage_tick(game: &Arc<Game>) -> ControlFlow<()> {
        let st = game.lock();
        if st.terminated {
            return ControlFlow::Break(());
        }
        if st.started {
            game.step_local(&st, |matrix, now| matrix.receive_garbage(now));
        }
        ControlFlow::Continue(())
    }

    fn send_matrix_tick(game: &Arc<Game>) -> ControlFlow<()> {
        let mut st = game.lock();
        if st.terminated {
            return ControlFlow::Break(());
        }
        if !st.started {
            return ControlFlow::Continue(());
        }
        let Some(player) = st.players.get(&game.local_player) else {
            return ControlFlow::Continue(());
        };
        let (snapshot, over) = {
            let matrix = lock(&player.matrix);
            (matrix.snapshot(), matrix.is_game_over())
        };
        if st.sent_game_over_matrix && over {
            return ControlFlow::Continue(());
        }

        game.out(Command::UpdateMatrix(UpdateMatrix {
            matrixes: BTreeMap::from([(0, snapshot)]),
        }));
        if over {
            st.sent_game_over_matrix = true;
        }
        ControlFlow::Continue(())
    }

    fn distribute_garbage_tick(game: &Arc<Game>) -> ControlFlow<()> {
        let mut st = game.lock();
        if st.terminated {
            return ControlFlow::Break(());
        }
        for player in st.players.values_mut() {
            if player.pending_garbage > 0 {
                player.write(Command::ReceiveGarbage(ReceiveGarbage {
                    lines: player.pending_garbage,
                }));
                player.pending_garbage = 0;
            }
        }
        ControlFlow::Continue(())
    }

    /// Host broadcast tick: prune dead connections, detect the end of the
    /// round, then send every board to everyone.
    pub(crate) fn distribute_matrixes_tick(game: &Arc<Game>) -> ControlFlow<()> {
        let mut st = game.lock();
        if st.terminated {
            return ControlFlow::Break(());
        }

        let gone: Vec<PlayerId> = st
            .players
            .iter()
            .filter(|(_, p)| p.is_terminated())
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            game.remove_player_locked(&mut st, id);
        }
        if st.terminated {
            return ControlFlow::Break(());
        }

        if st.started && !st.game_over && !st.local {
            let live: Vec<PlayerId> = st
                .players
                .iter()
                .filter(|(_, p)| !lock(&p.matrix).is_game_over())
                .map(|(id, _)| *id)
                .collect();
            if live.len() <= 1 {
                game.finish_round_locked(&mut st, live.first().copied());
            }
        }

        let mut matrixes = BTreeMap::new();
        for (id, player) in &st.players {
            let mut matrix = lock(&player.matrix);
            matrix.player_name = player.name.clone();
            matrix.garbage_sent = player.total_garbage_sent;
            matrix.garbage_received = player.total_garbage_received;
            matrixes.insert(*id, matrix.snapshot());
        }
        game.write_all_locked(&st, Command::UpdateMatrix(UpdateMatrix { matrixes }));
        ControlFlow::Continue(())
    }

    fn finish_round_locked(self: &Arc<Self>, st: &mut GameState, survivor: Option<PlayerId>) {
        st.game_over = true;

        let winner = survivor
            .and_then(|id| st.players.get(&id))
            .map_or_else(|| TIE.to_string(), |p| p.name.clone());
        self.write_all_locked(
            st,
            Command::GameOver(GameOver {
                player: PLAYER_UNKNOWN,
                winner: winner.clone(),
            }),
        );

        self.write_message_locked(st, format!("Game over - winner: {}", winner));
        self.write_message_locked(st, "Garbage sent/received:");
        for player in st.players.values() {
            self.write_message_locked(
                st,
                format!(
                    "{} - {}/{}",
                    player.name, player.total_garbage_sent, player.total_garbage_received
                ),
            );
        }
        if st.players.len() < 2 {
            self.write_message_locked(st, "Game will start when there are at least two players");
        }

        self.spawn_restart();
    }

    fn spawn_restart(self: &Arc<Self>) {
        let game = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(RESTART_DELAY_SECS)).await;
                let mut st = game.lock();
                if st.terminated {
                    return;
                }
                if st.players.len() > 1 {
                    game.reset_locked(&mut st);
                    game.start_locked(&mut st, 0);
                    return;
                }
            }
        });
    }

    // ============== Client command dispatch ==============

    /// Apply commands from the host until the connection ends, then terminate.
    pub async fn handle_read_commands(self: Arc<Self>, mut rx: mpsc::Receiver<InboundCommand>) {
        while let Some(inbound) = rx.recv().await {
            self.handle_command(inbound);
        }
        debug!(game = self.id, "command stream ended");
        self.terminate();
    }

    pub fn handle_command(self: &Arc<Self>, inbound: InboundCommand) {
        let kind = inbound.command.kind();
        if kind.is_chatty() {
            trace!(game = self.id, source = inbound.source, %kind, "handle command");
        } else {
            debug!(game = self.id, source = inbound.source, %kind, "handle command");
        }

        let mut st = self.lock();
        match inbound.command {
            Command::Message(message) => {
                let prefix = if message.player > 0 {
                    let name = st
                        .players
                        .get(&message.player)
                        .map_or(ANONYMOUS, |p| p.name.as_str());
                    format!("<{}> ", name)
                } else {
                    "* ".to_string()
                };
                self.log_message(format!("{}{}", prefix, message.message));
            }
            Command::Nickname(nick) => {
                if let Some(player) = st.players.get_mut(&nick.player) {
                    let new = sanitize_nickname(&nick.nickname);
                    if new != player.name {
                        let old = std::mem::replace(&mut player.name, new.clone());
                        lock(&player.matrix).player_name = new.clone();
                        self.log_message(format!("* {} is now known as {}", old, new));
                    }
                }
            }
            Command::JoinGame(_) => self.reset_locked(&mut st),
            Command::QuitGame(quit) => self.remove_player_locked(&mut st, quit.player),
            Command::UpdateGame(update) => self.process_update_game_locked(&mut st, &update),
            Command::StartGame(start) => {
                self.start_locked(&mut st, start.seed);
                if start.started {
                    if let Some(player) = st.players.get(&self.local_player) {
                        lock(&player.matrix).mark_game_over();
                    }
                }
            }
            Command::UpdateMatrix(update) => {
                for (id, snapshot) in &update.matrixes {
                    let Some(player) = st.players.get(id) else {
                        continue;
                    };
                    let mut matrix = lock(&player.matrix);
                    if *id == self.local_player {
                        matrix.garbage_sent = snapshot.garbage_sent;
                        matrix.garbage_received = snapshot.garbage_received;
                    } else {
                        matrix.replace(snapshot);
                    }
                }
            }
            Command::ReceiveGarbage(garbage) => {
                if let Some(player) = st.players.get(&self.local_player) {
                    lock(&player.matrix).add_pending_garbage(garbage.lines, now());
                }
            }
            Command::GameOver(over) => {
                if !over.winner.is_empty() {
                    st.game_over = true;
                    for player in st.players.values() {
                        lock(&player.matrix).set_game_over();
                    }
                } else if let Some(player) = st.players.get(&over.player) {
                    lock(&player.matrix).set_game_over();
                }
            }
            other => warn!(game = self.id, kind = %other.kind(), "unhandled command"),
        }
    }

    // ============== Host command handling ==============

    /// Broadcast a chat line from `source`, trimmed and flattened to one line.
    pub fn relay_message(&self, source: PlayerId, message: &str) {
        let st = self.lock();
        let Some(player) = st.players.get(&source) else {
            return;
        };
        info!(game = self.id, "<{}> {}", player.name, message);

        let message = message.trim().replace('\n', "");
        if !message.is_empty() {
            self.write_all_locked(&st, create_message(source, message));
        }
    }

    pub fn rename_player(&self, source: PlayerId, nickname: &str) {
        let mut st = self.lock();
        let Some(player) = st.players.get_mut(&source) else {
            return;
        };
        let new = sanitize_nickname(nickname);
        if new == player.name {
            return;
        }
        let old = std::mem::replace(&mut player.name, new.clone());
        self.log_message(format!("* {} is now known as {}", old, new));
        self.write_all_locked(
            &st,
            Command::Nickname(Nickname {
                player: source,
                nickname: new,
            }),
        );
    }

    /// Replace the host's mirror of `source`'s board
    pub fn mirror_matrix(&self, source: PlayerId, update: &UpdateMatrix) {
        let st = self.lock();
        let Some(player) = st.players.get(&source) else {
            return;
        };
        let mut matrix = lock(&player.matrix);
        for snapshot in update.matrixes.values() {
            matrix.replace(snapshot);
        }
    }

    pub fn knock_out(&self, source: PlayerId) {
        let st = self.lock();
        let Some(player) = st.players.get(&source) else {
            return;
        };
        lock(&player.matrix).set_game_over();

        self.write_message_locked(&st, format!("{} was knocked out", player.name));
        self.write_all_locked(
            &st,
            Command::GameOver(GameOver {
                player: source,
                winner: String::new(),
            }),
        );
    }

    /// Route garbage to the live opponent with the least received so far,
    /// lowest id on ties. Returns the target.
    pub fn send_garbage(&self, source: PlayerId, lines: u32) -> Option<PlayerId> {
        let mut st = self.lock();

        let mut target: Option<(PlayerId, u32)> = None;
        for (&id, player) in &st.players {
            if id == source || lock(&player.matrix).is_game_over() {
                continue;
            }
            if target.map_or(true, |(_, least)| player.total_garbage_received < least) {
                target = Some((id, player.total_garbage_received));
            }
        }

        let (target, _) = target?;
        if let Some(player) = st.players.get_mut(&target) {
            player.total_garbage_received += lines;
            player.pending_garbage += lines;
        }
        if let Some(player) = st.players.get_mut(&source) {
            player.total_garbage_sent += lines;
        }
        debug!(game = self.id, source, target, lines, "garbage routed");
        Some(target)
    }
}
