//! Live dashboard rendering.
//!
//! Fixed monochrome layout in double-line boxes: a fleet summary up top and
//! a two-column grid of worker panels below it. Every text cell is truncated
//! and right-padded to its column width so the borders stay rectangular;
//! boxes that fall outside a small terminal are clipped, never wrapped.

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Rect},
    text::Line,
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame, Terminal,
};
use sweep_protocol::StatusRecord;

use crate::aggregate::AggregateSummary;

const MARGIN: u16 = 1;
const SUMMARY_WIDTH: u16 = 92;
const SUMMARY_HEIGHT: u16 = 6;
const SUMMARY_GRID_ROWS: usize = 4;
const SUMMARY_LEFT_CELL: usize = 45;
const SUMMARY_RIGHT_CELL: usize = 42;
const WORKER_PANEL_WIDTH: u16 = 45;
const WORKER_PANEL_HEIGHT: u16 = 10;
const WORKER_CELL: usize = 41;
// Panel width plus the two-column gutter.
const COLUMN_STRIDE: u16 = 47;
// First grid row below the summary box.
const WORKER_GRID_TOP: u16 = 8;
const DONE_WIDTH: u16 = 21;
const DONE_HEIGHT: u16 = 6;

/// Everything one frame needs, borrowed from the controller.
pub struct DashboardView<'a> {
    /// Last known record per worker, indexed by worker id.
    pub records: &'a [Option<StatusRecord>],
    /// Fleet summary, absent until every worker has reported once.
    pub summary: Option<&'a AggregateSummary>,
    /// Draw the completion overlay on top of the grid.
    pub done: bool,
}

/// Render a full dashboard frame.
pub fn draw(f: &mut Frame, view: &DashboardView) {
    if let Some(summary) = view.summary {
        draw_summary(f, summary);
    }
    for (id, record) in view.records.iter().enumerate() {
        if let Some(record) = record {
            draw_worker_panel(f, id, record);
        }
    }
    if view.done {
        draw_done_overlay(f, view.records.len());
    }
}

// ---------------------------------------------------------------------------
// Widgets
// ---------------------------------------------------------------------------

fn draw_summary(f: &mut Frame, summary: &AggregateSummary) {
    let area = Rect::new(MARGIN, MARGIN, SUMMARY_WIDTH, SUMMARY_HEIGHT).intersection(f.size());
    if area.width < 2 || area.height < 2 {
        return;
    }
    let lines = summary_lines(summary);
    let rows: Vec<Line> = (0..SUMMARY_GRID_ROWS)
        .map(|row| Line::from(summary_row(&lines[row], &lines[row + SUMMARY_GRID_ROWS])))
        .collect();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .title("═ Summary ");
    f.render_widget(Paragraph::new(rows).block(block).alignment(Alignment::Left), area);
}

fn draw_worker_panel(f: &mut Frame, id: usize, record: &StatusRecord) {
    let area = worker_panel_area(id).intersection(f.size());
    if area.width < 2 || area.height < 2 {
        return;
    }
    let rows: Vec<Line> = worker_lines(record)
        .into_iter()
        .map(|line| Line::from(format!(" {}", cell(&line, WORKER_CELL))))
        .collect();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .title(format!("═ Worker {} ", id));
    f.render_widget(Paragraph::new(rows).block(block).alignment(Alignment::Left), area);
}

fn draw_done_overlay(f: &mut Frame, worker_count: usize) {
    let area = done_overlay_area(worker_count).intersection(f.size());
    if area.width < 2 || area.height < 2 {
        return;
    }
    f.render_widget(Clear, area);
    let text = vec![
        Line::from(""),
        Line::from("Done!"),
        Line::from("(press q to quit)"),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double);
    f.render_widget(
        Paragraph::new(text).block(block).alignment(Alignment::Center),
        area,
    );
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Panel for worker `id`: two columns, filled left to right, top to bottom.
fn worker_panel_area(id: usize) -> Rect {
    let column = (id % 2) as u16;
    let row = (id / 2) as u16;
    Rect::new(
        MARGIN + column * COLUMN_STRIDE,
        WORKER_GRID_TOP + row * WORKER_PANEL_HEIGHT,
        WORKER_PANEL_WIDTH,
        WORKER_PANEL_HEIGHT,
    )
}

/// Completion box, centered over the worker grid.
fn done_overlay_area(worker_count: usize) -> Rect {
    let rows = (worker_count.max(1) + 1) / 2;
    let columns: u16 = if worker_count > 1 { 2 } else { 1 };
    let grid_width = columns * COLUMN_STRIDE - 2;
    let grid_height = rows as u16 * WORKER_PANEL_HEIGHT;
    Rect::new(
        MARGIN + (grid_width - DONE_WIDTH) / 2,
        WORKER_GRID_TOP + (grid_height - DONE_HEIGHT) / 2,
        DONE_WIDTH,
        DONE_HEIGHT,
    )
}

// ---------------------------------------------------------------------------
// Text cells
// ---------------------------------------------------------------------------

fn summary_lines(summary: &AggregateSummary) -> Vec<String> {
    vec![
        format!("checked:   {}", format_count(summary.checked)),
        format!("skipped:   {}", format_count(summary.skipped)),
        format!("filtered:  {}", format_count(summary.filtered)),
        format!("hidden:    {}", format_count(summary.hidden)),
        format!("ips:       {}", format_count(summary.ips)),
        format!("progress:  {:.3}%", summary.progress_percent),
        format!("elapsed:   {:.2}hrs", summary.elapsed_hours),
        format!("eta:       {:.1}hrs", summary.eta_hours),
    ]
}

fn worker_lines(record: &StatusRecord) -> Vec<String> {
    vec![
        format!("insn:      {}", record.insn),
        format!("cs_disas:  {}", record.cs_disas),
        format!("opc_disas: {}", record.libopcodes_disas),
        format!("checked:   {}", format_count(record.instructions_checked)),
        format!("skipped:   {}", format_count(record.instructions_skipped)),
        format!("filtered:  {}", format_count(record.instructions_filtered)),
        format!("hidden:    {}", format_count(record.hidden_instructions_found)),
        format!("ips:       {}", format_count(record.instructions_per_sec)),
    ]
}

/// One summary body row: left and right column cells at fixed offsets.
fn summary_row(left: &str, right: &str) -> String {
    format!(
        " {}  {}",
        cell(left, SUMMARY_LEFT_CELL),
        cell(right, SUMMARY_RIGHT_CELL)
    )
}

/// Truncate to `width` characters and right-pad with spaces.
fn cell(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{truncated:<width$}")
}

/// Render a counter with `,` thousands separators.
fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ---------------------------------------------------------------------------
// Keyboard input
// ---------------------------------------------------------------------------

/// What a terminal event means to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    None,
    Quit,
    Interrupt,
}

/// Map a terminal event to its action. In raw mode Ctrl+C arrives as an
/// ordinary key event, so the interrupt check comes first.
pub fn classify(event: &Event) -> InputAction {
    if let Event::Key(key) = event {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return InputAction::Interrupt;
        }
        if key.code == KeyCode::Char('q') {
            return InputAction::Quit;
        }
    }
    InputAction::None
}

// ---------------------------------------------------------------------------
// Terminal session
// ---------------------------------------------------------------------------

/// The supervisor's side of the terminal: frames out, key presses in.
///
/// [`TerminalSession`] is the live implementation; the run loop only
/// depends on this trait, so it can be driven off-screen as well.
pub trait Console {
    /// Render one frame.
    fn draw(&mut self, view: &DashboardView) -> io::Result<()>;

    /// Wait up to `timeout` for a key press.
    fn poll_input(&mut self, timeout: Duration) -> io::Result<InputAction>;

    /// Block until the next key press.
    fn wait_input(&mut self) -> io::Result<InputAction>;
}

/// Raw-mode alternate-screen terminal, restored on drop.
pub struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    /// Enter raw mode on the alternate screen. The terminal is restored
    /// when the session drops, whichever way the caller exits.
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err);
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(err) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(err);
            }
        };
        Ok(Self { terminal })
    }
}

impl Console for TerminalSession {
    fn draw(&mut self, view: &DashboardView) -> io::Result<()> {
        self.terminal.draw(|f| draw(f, view))?;
        Ok(())
    }

    fn poll_input(&mut self, timeout: Duration) -> io::Result<InputAction> {
        if event::poll(timeout)? {
            return Ok(classify(&event::read()?));
        }
        Ok(InputAction::None)
    }

    fn wait_input(&mut self) -> io::Result<InputAction> {
        Ok(classify(&event::read()?))
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
