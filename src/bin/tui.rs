use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use crossterm::{event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind}, execute, terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{backend::CrosstermBackend, Terminal, widgets::{Block, Borders, Clear, List, ListItem, Paragraph, ListState}, layout::{Layout, Constraint, Direction, Rect}, style::{Style, Modifier, Color}};
use tokio::sync::broadcast::{self, error::TryRecvError};

use medminder::{
    application::{
        auth::{AuthUser, TokenAuthenticator},
        change_feed::{ChangeFeed, ChangeSignal},
        medication_service::{MedicationService, MedicationServiceImpl, ScheduleEntry},
    },
    config::AppConfig,
    domain::{
        medication::{MedicationId, MedicationPatch, NewMedication},
        repository::MedicationRepository,
        schedule::{duration::DurationRequest, projector::SortBy},
    },
    infrastructure::sqlite_repo::{prepare_sqlite_file, SqliteMedicationRepository},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    prepare_sqlite_file(&config.database_url)?;
    let repo = SqliteMedicationRepository::connect(&config.database_url).await?;
    repo.init().await?;
    let user = TokenAuthenticator::new(repo.clone()).ensure_account(&config.local_user_email, &config.local_user_name).await?;
    let service = MedicationServiceImpl::new(repo, ChangeFeed::new(config.event_buffer));

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, service, user, &config.database_url).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    res
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode { View, Create, Edit(MedicationId) }

/// The one interactive region that may be open over the lists.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Overlay { Closed, Actions(MedicationId), Filters }

/// Messages routed to whichever overlay is open.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Msg { Dismiss, ToggleTaken, Edit, Duplicate, Delete, CycleSort, ToggleCompleted }

#[derive(Clone, Copy, PartialEq, Eq)]
enum DurationMode { Days, Range }

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field { Name, Time, Dosage, Person, Mode, Days, Start, End }

#[derive(Default)]
struct Draft { name: String, time: String, dosage: String, person: String, days: String, start: String, end: String }

struct DayColumn {
    title: &'static str,
    date: NaiveDate,
    entries: Vec<ScheduleEntry>,
    selected: usize,
    list_state: ListState,
}

impl DayColumn {
    fn new(title: &'static str, date: NaiveDate) -> Self {
        Self { title, date, entries: Vec::new(), selected: 0, list_state: ListState::default() }
    }

    fn clamp(&mut self) {
        let len = self.entries.len();
        if len == 0 { self.selected = 0; self.list_state.select(None); }
        else { if self.selected >= len { self.selected = len - 1; } self.list_state.select(Some(self.selected)); }
    }

    fn current(&self) -> Option<&ScheduleEntry> { self.entries.get(self.selected) }
}

struct App<R: MedicationRepository> {
    service: MedicationServiceImpl<R>,
    user: AuthUser,
    changes: broadcast::Receiver<ChangeSignal>,
    columns: [DayColumn; 2],
    focus: usize,
    sort_by: SortBy,
    show_completed: bool,
    last_tick: Instant,
    mode: Mode,
    overlay: Overlay,
    field: Field,
    duration_mode: DurationMode,
    draft: Draft,
    status: String,
}

impl<R: MedicationRepository> App<R> {
    /// Rebuilds both days from a fresh snapshot.
    async fn load(&mut self) -> Result<()> {
        let today = Local::now().date_naive();
        self.columns[0].date = today;
        self.columns[1].date = today.succ_opt().unwrap_or(today);
        for column in self.columns.iter_mut() {
            column.entries = self.service.schedule(self.user.id, column.date, self.show_completed, self.sort_by).await?;
            column.clamp();
        }
        Ok(())
    }

    /// True when a change for this account arrived since the last check.
    fn drain_changes(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.changes.try_recv() {
                Ok(signal) => changed |= signal.user_id == self.user.id,
                Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return changed,
            }
        }
    }

    fn selected_id(&self) -> Option<MedicationId> {
        self.columns[self.focus].current().map(|e| e.medication.medication.id)
    }

    async fn dispatch(&mut self, msg: Msg) -> Result<()> {
        match (self.overlay, msg) {
            (_, Msg::Dismiss) => { self.overlay = Overlay::Closed; }
            (Overlay::Actions(id), Msg::ToggleTaken) => { self.overlay = Overlay::Closed; self.toggle_taken(id).await?; }
            (Overlay::Actions(id), Msg::Edit) => { self.overlay = Overlay::Closed; self.begin_edit(id); }
            (Overlay::Actions(id), Msg::Duplicate) => { self.overlay = Overlay::Closed; self.duplicate(id).await?; }
            (Overlay::Actions(id), Msg::Delete) => { self.overlay = Overlay::Closed; self.delete(id).await?; }
            (Overlay::Filters, Msg::CycleSort) => { self.sort_by = self.sort_by.next(); self.load().await?; }
            (Overlay::Filters, Msg::ToggleCompleted) => { self.show_completed = !self.show_completed; self.load().await?; }
            _ => {}
        }
        Ok(())
    }

    async fn toggle_taken(&mut self, id: MedicationId) -> Result<()> {
        if self.focus != 0 { self.status = "Only today's doses can be marked".into(); return Ok(()); }
        let column = &self.columns[self.focus];
        let Some(entry) = column.entries.iter().find(|e| e.medication.medication.id == id) else { return Ok(()) };
        let taken = entry.medication.taken;
        let date = column.date;
        let result = if taken {
            self.service.unmark(self.user.id, id, date).await.map(|_| "Unmarked".to_string())
        } else {
            self.service.mark_taken(self.user.id, id, Some(self.user.name.clone())).await.map(|_| "Marked taken".to_string())
        };
        self.status = result.unwrap_or_else(|e| format!("Error: {e}"));
        self.load().await
    }

    async fn duplicate(&mut self, id: MedicationId) -> Result<()> {
        self.status = match self.service.duplicate(self.user.id, id).await {
            Ok(Some(copy)) => format!("Added {}", copy.name),
            Ok(None) => "Already gone".into(),
            Err(e) => format!("Error: {e}"),
        };
        self.load().await
    }

    async fn delete(&mut self, id: MedicationId) -> Result<()> {
        self.status = match self.service.delete(self.user.id, id).await {
            Ok(true) => "Deleted".into(),
            Ok(false) => "Already gone".into(),
            Err(e) => format!("Error: {e}"),
        };
        let column = &mut self.columns[self.focus];
        if column.selected > 0 { column.selected -= 1; }
        self.load().await
    }

    fn begin_create(&mut self) {
        self.mode = Mode::Create;
        self.field = Field::Name;
        self.duration_mode = DurationMode::Days;
        self.draft = Draft::default();
    }

    fn begin_edit(&mut self, id: MedicationId) {
        let Some(entry) = self.columns[self.focus].entries.iter().find(|e| e.medication.medication.id == id) else { return };
        let med = &entry.medication.medication;
        self.draft = Draft {
            name: med.name.clone(),
            time: med.time.clone(),
            dosage: med.dosage.clone().unwrap_or_default(),
            person: med.person_name.clone().unwrap_or_default(),
            days: med.course.map(|c| c.days_needed.to_string()).unwrap_or_default(),
            start: String::new(),
            end: String::new(),
        };
        self.duration_mode = DurationMode::Days;
        self.field = Field::Name;
        self.mode = Mode::Edit(id);
    }

    fn duration_request(&self) -> Option<DurationRequest> {
        match self.duration_mode {
            DurationMode::Days if !self.draft.days.trim().is_empty() => {
                Some(DurationRequest::Days { days: self.draft.days.trim().parse().ok() })
            }
            DurationMode::Range if !self.draft.start.trim().is_empty() && !self.draft.end.trim().is_empty() => {
                Some(DurationRequest::Range { start: Some(self.draft.start.clone()), end: Some(self.draft.end.clone()) })
            }
            _ => None,
        }
    }

    async fn save(&mut self) -> Result<()> {
        let non_empty = |s: &str| { let s = s.trim(); if s.is_empty() { None } else { Some(s.to_string()) } };
        let duration = self.duration_request();
        let result = match self.mode {
            Mode::Create => self.service.create(self.user.id, NewMedication {
                name: self.draft.name.clone(),
                time: self.draft.time.clone(),
                dosage: non_empty(&self.draft.dosage),
                person_name: non_empty(&self.draft.person),
                notes: None,
                duration,
            }).await.map(|_| "Added".to_string()),
            Mode::Edit(id) => self.service.update(self.user.id, id, MedicationPatch {
                name: non_empty(&self.draft.name),
                time: non_empty(&self.draft.time),
                dosage: Some(self.draft.dosage.clone()),
                person_name: Some(self.draft.person.clone()),
                notes: None,
                duration,
                clear_duration: false,
            }).await.map(|_| "Saved".to_string()),
            Mode::View => return Ok(()),
        };
        match result {
            Ok(msg) => { self.status = msg; self.mode = Mode::View; self.draft = Draft::default(); }
            // Stay in the form so the input can be fixed.
            Err(e) => { self.status = format!("Error: {e}"); }
        }
        self.load().await
    }

    fn visible_fields(&self) -> Vec<Field> {
        let mut fields = vec![Field::Name, Field::Time, Field::Dosage, Field::Person, Field::Mode];
        match self.duration_mode {
            DurationMode::Days => fields.push(Field::Days),
            DurationMode::Range => { fields.push(Field::Start); fields.push(Field::End); }
        }
        fields
    }

    fn next_field(&mut self) {
        let fields = self.visible_fields();
        let pos = fields.iter().position(|f| *f == self.field).unwrap_or(0);
        self.field = fields[(pos + 1) % fields.len()];
    }

    fn active_input(&mut self) -> Option<&mut String> {
        match self.field {
            Field::Name => Some(&mut self.draft.name),
            Field::Time => Some(&mut self.draft.time),
            Field::Dosage => Some(&mut self.draft.dosage),
            Field::Person => Some(&mut self.draft.person),
            Field::Days => Some(&mut self.draft.days),
            Field::Start => Some(&mut self.draft.start),
            Field::End => Some(&mut self.draft.end),
            Field::Mode => None,
        }
    }
}

fn field_label(field: Field) -> &'static str {
    match field {
        Field::Name => "Name", Field::Time => "Time (HH:MM)", Field::Dosage => "Dosage", Field::Person => "For",
        Field::Mode => "Duration mode", Field::Days => "Days", Field::Start => "Start (YYYY-MM-DD)", Field::End => "End (YYYY-MM-DD)",
    }
}

fn entry_line(entry: &ScheduleEntry) -> String {
    let view = &entry.medication;
    let mark = if view.taken { "[x]" } else { "[ ]" };
    let person = view.medication.person_name.as_deref().map(|p| format!(" ({p})")).unwrap_or_default();
    format!("{} {} {}{}", mark, view.medication.time, view.medication.name, person)
}

fn entry_detail(entry: &ScheduleEntry) -> String {
    let view = &entry.medication;
    let med = &view.medication;
    let mut text = format!("Name: {}\nTime: {}\nDosage: {}\nFor: {}\n",
        med.name, med.time, med.dosage.as_deref().unwrap_or("-"), med.person_name.as_deref().unwrap_or("-"));
    if view.taken {
        let at = view.taken_at.map(|t| t.with_timezone(&Local).format("%H:%M").to_string()).unwrap_or_default();
        text.push_str(&format!("\nTaken at {} by {}\n", at, view.marked_by.as_deref().unwrap_or("someone")));
    }
    match entry.progress {
        Some(p) if p.is_complete => text.push_str(&format!("\nCourse complete ({} days)", p.days_needed)),
        Some(p) => text.push_str(&format!("\nDay {} of {} ({:.0}%), {} left", p.days_elapsed, p.days_needed, p.progress_percent, p.days_remaining)),
        None => text.push_str("\nOngoing"),
    }
    text
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect { x: area.x + (area.width - w) / 2, y: area.y + (area.height - h) / 2, width: w, height: h }
}

async fn run_app<R: MedicationRepository>(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, service: MedicationServiceImpl<R>, user: AuthUser, database_url: &str) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let today = Local::now().date_naive();
    let changes = service.subscribe();
    let mut app = App {
        service, user, changes,
        columns: [DayColumn::new("Today", today), DayColumn::new("Tomorrow", today.succ_opt().unwrap_or(today))],
        focus: 0, sort_by: SortBy::Time, show_completed: true, last_tick: Instant::now(),
        mode: Mode::View, overlay: Overlay::Closed, field: Field::Name, duration_mode: DurationMode::Days,
        draft: Draft::default(), status: String::new(),
    };
    app.load().await?;

    loop {
        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(3)])
                .split(f.size());

            let header = Paragraph::new("Enter: taken, n: new, e: edit, d: delete, m: menu, f: filters, s: sort, c: completed, Tab: day, q: quit")
                .block(Block::default().borders(Borders::ALL).title(format!("medminder — {}", app.user.name)));
            f.render_widget(header, chunks[0]);

            let middle = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(35), Constraint::Percentage(30)])
                .split(chunks[1]);

            for (i, column) in app.columns.iter_mut().enumerate() {
                let items: Vec<ListItem> = column.entries.iter().map(|e| ListItem::new(entry_line(e))).collect();
                let border = if i == app.focus { Style::default().fg(Color::Cyan) } else { Style::default() };
                let list = List::new(items)
                    .block(Block::default().borders(Borders::ALL).border_style(border).title(format!("{} {}", column.title, column.date.format("%a %d %b"))))
                    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::REVERSED))
                    .highlight_symbol(">> ");
                if i != app.focus { column.list_state.select(None); } else { column.clamp(); }
                f.render_stateful_widget(list, middle[i], &mut column.list_state);
            }

            let detail = app.columns[app.focus].current().map(entry_detail).unwrap_or_else(|| "(nothing scheduled)".to_string());
            f.render_widget(Paragraph::new(detail).block(Block::default().borders(Borders::ALL).title("details")), middle[2]);

            match app.overlay {
                Overlay::Closed => {}
                Overlay::Actions(_) => {
                    let area = centered(f.size(), 30, 8);
                    f.render_widget(Clear, area);
                    f.render_widget(Paragraph::new("t: toggle taken\ne: edit\nc: duplicate\nd: delete\nEsc: close")
                        .block(Block::default().borders(Borders::ALL).title("actions")), area);
                }
                Overlay::Filters => {
                    let area = centered(f.size(), 34, 6);
                    f.render_widget(Clear, area);
                    f.render_widget(Paragraph::new(format!("s: sort [{}]\nc: show completed [{}]\nEsc: close", app.sort_by, if app.show_completed { "on" } else { "off" }))
                        .block(Block::default().borders(Borders::ALL).title("filters")), area);
                }
            }

            let footer_text = match app.mode {
                Mode::View => format!("DATABASE_URL={}  |  sort={}  completed={}  |  {}", database_url, app.sort_by, if app.show_completed { "shown" } else { "hidden" }, app.status),
                Mode::Create | Mode::Edit(_) => {
                    let value = match app.field {
                        Field::Mode => match app.duration_mode { DurationMode::Days => "days (Space to switch)".to_string(), DurationMode::Range => "range (Space to switch)".to_string() },
                        Field::Name => app.draft.name.clone(), Field::Time => app.draft.time.clone(), Field::Dosage => app.draft.dosage.clone(),
                        Field::Person => app.draft.person.clone(), Field::Days => app.draft.days.clone(), Field::Start => app.draft.start.clone(), Field::End => app.draft.end.clone(),
                    };
                    format!("{}: {}_  |  (Tab next field, Enter save, Esc cancel)  {}", field_label(app.field), value, app.status)
                }
            };
            let footer = Paragraph::new(footer_text)
                .block(Block::default().borders(Borders::ALL).title(match app.mode { Mode::View => "info", Mode::Create => "new medication", Mode::Edit(_) => "edit medication" }));
            f.render_widget(footer, chunks[2]);
        })?;

        let timeout = tick_rate.saturating_sub(app.last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                // Only act on key presses; ignore repeats and releases to prevent duplicate input
                if key.kind != KeyEventKind::Press { continue; }
                match (app.mode, app.overlay) {
                    (Mode::View, Overlay::Actions(_)) => match key.code {
                        KeyCode::Esc => app.dispatch(Msg::Dismiss).await?,
                        KeyCode::Char('t') | KeyCode::Enter => app.dispatch(Msg::ToggleTaken).await?,
                        KeyCode::Char('e') => app.dispatch(Msg::Edit).await?,
                        KeyCode::Char('c') => app.dispatch(Msg::Duplicate).await?,
                        KeyCode::Char('d') => app.dispatch(Msg::Delete).await?,
                        _ => {}
                    },
                    (Mode::View, Overlay::Filters) => match key.code {
                        KeyCode::Esc | KeyCode::Char('f') => app.dispatch(Msg::Dismiss).await?,
                        KeyCode::Char('s') => app.dispatch(Msg::CycleSort).await?,
                        KeyCode::Char('c') => app.dispatch(Msg::ToggleCompleted).await?,
                        _ => {}
                    },
                    (Mode::View, Overlay::Closed) => match key.code {
                        KeyCode::Char('q') => break,
                        KeyCode::Up => { let c = &mut app.columns[app.focus]; if c.selected > 0 { c.selected -= 1; } }
                        KeyCode::Down => { let c = &mut app.columns[app.focus]; if c.selected + 1 < c.entries.len() { c.selected += 1; } }
                        KeyCode::Tab | KeyCode::Left | KeyCode::Right => { app.focus = 1 - app.focus; app.columns[app.focus].clamp(); }
                        KeyCode::Enter => { if let Some(id) = app.selected_id() { app.toggle_taken(id).await?; } }
                        KeyCode::Char('n') => app.begin_create(),
                        KeyCode::Char('e') => { if let Some(id) = app.selected_id() { app.begin_edit(id); } }
                        KeyCode::Char('d') => { if let Some(id) = app.selected_id() { app.delete(id).await?; } }
                        KeyCode::Char('m') => { if let Some(id) = app.selected_id() { app.overlay = Overlay::Actions(id); } }
                        KeyCode::Char('f') => { app.overlay = Overlay::Filters; }
                        KeyCode::Char('s') => { app.sort_by = app.sort_by.next(); app.load().await?; }
                        KeyCode::Char('c') => { app.show_completed = !app.show_completed; app.load().await?; }
                        KeyCode::Esc => app.dispatch(Msg::Dismiss).await?,
                        _ => {}
                    },
                    (Mode::Create | Mode::Edit(_), _) => match key.code {
                        KeyCode::Esc => { app.mode = Mode::View; app.draft = Draft::default(); app.status.clear(); }
                        KeyCode::Enter => app.save().await?,
                        KeyCode::Tab => app.next_field(),
                        KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right if app.field == Field::Mode => {
                            app.duration_mode = match app.duration_mode { DurationMode::Days => DurationMode::Range, DurationMode::Range => DurationMode::Days };
                        }
                        KeyCode::Backspace => { if let Some(input) = app.active_input() { input.pop(); } }
                        KeyCode::Char(c) => { if let Some(input) = app.active_input() { input.push(c); } }
                        _ => {}
                    },
                }
            }
        }
        if app.drain_changes() {
            app.load().await?;
        }
        if app.last_tick.elapsed() >= tick_rate {
            app.last_tick = Instant::now();
        }
    }
    Ok(())
}
