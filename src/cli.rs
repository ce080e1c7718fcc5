use std::{
    collections::BTreeMap,
    env,
    io::{self, IsTerminal, Write},
    process::{Command, Stdio},
};

use anyhow::{Context, bail};
use chrono::{Datelike, Days, Local, Months, NaiveDate};

use slot_blocker::{
    app::{AppState, CalendarNavigator, ViewType},
    calendar::{BlockedSlot, DateRange, DayStatus, SlotKey, TimeGrid, TimeSlots},
    storage::{blocked_store::BlockedSlotStore, config::Config},
    sync::{
        blocked_slots_api::HttpBlockedSlotsClient,
        in_memory_api::InMemoryBlockedSlotsApi,
        orchestrator::{BatchOutcome, BlockOrchestrator},
    },
};

pub const USAGE: &str = "Usage: slot-blocker [--offline] [--list | --week [YYYY/MM/DD] | --month [YYYY/MM/DD] \
| --block YYYY/MM/DD [HH:MM[-HH:MM]] [--to YYYY/MM/DD] [--reason TEXT] | --unblock ID | --apply-recurring]";

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRequest {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
    pub times: Option<(String, String)>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CliMode {
    Today,
    List,
    Week(NaiveDate),
    Month(NaiveDate),
    Block(BlockRequest),
    Unblock(String),
    ApplyRecurring,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub offline: bool,
    pub mode: CliMode,
}

pub fn parse_cli_mode() -> Result<CliOptions, String> {
    parse_args(env::args().skip(1), Local::now().date_naive())
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .map_err(|_| format!("Invalid date '{}'. Use YYYY/MM/DD.", value))
}

fn parse_times(value: &str) -> (String, String) {
    match value.split_once('-') {
        Some((start, end)) => (start.to_string(), end.to_string()),
        None => (value.to_string(), value.to_string()),
    }
}

pub fn parse_args<I>(args: I, today: NaiveDate) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut offline = false;
    let mut mode = None;
    let mut to = None;
    let mut reason = None;
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--offline" => offline = true,
            "--list" => mode = Some(CliMode::List),
            "--week" | "--month" => {
                let date = match args.next_if(|next| !next.starts_with("--")) {
                    Some(value) => parse_date(&value)?,
                    None => today,
                };
                mode = Some(if arg == "--week" {
                    CliMode::Week(date)
                } else {
                    CliMode::Month(date)
                });
            }
            "--block" => {
                let value = args.next().ok_or("--block needs a date")?;
                let from = parse_date(&value)?;
                let times = args
                    .next_if(|next| !next.starts_with("--"))
                    .map(|value| parse_times(&value));
                mode = Some(CliMode::Block(BlockRequest {
                    from,
                    to: None,
                    times,
                    reason: None,
                }));
            }
            "--to" => {
                let value = args.next().ok_or("--to needs a date")?;
                to = Some(parse_date(&value)?);
            }
            "--reason" => {
                reason = Some(args.next().ok_or("--reason needs a text")?);
            }
            "--unblock" => {
                let id = args.next().ok_or("--unblock needs an id")?;
                mode = Some(CliMode::Unblock(id));
            }
            "--apply-recurring" => mode = Some(CliMode::ApplyRecurring),
            "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => return Err(format!("Unknown argument: {}", arg)),
        }
    }

    let mode = match mode.unwrap_or(CliMode::Today) {
        CliMode::Block(mut request) => {
            request.to = to;
            request.reason = reason;
            CliMode::Block(request)
        }
        other => {
            if to.is_some() || reason.is_some() {
                return Err("--to and --reason only apply to --block".to_string());
            }
            other
        }
    };

    Ok(CliOptions { offline, mode })
}

pub fn build_store(config: &Config, offline: bool) -> BlockedSlotStore {
    if offline || config.blocking.offline_mode {
        tracing::info!("Running against the in-memory blocked slot service");
        BlockedSlotStore::new(Box::new(InMemoryBlockedSlotsApi::new()))
    } else {
        let client = HttpBlockedSlotsClient::new(config.api.base_url.clone())
            .with_token(config.api.token.clone());
        BlockedSlotStore::new(Box::new(client))
    }
}

pub async fn run(options: CliOptions, config: Config) -> anyhow::Result<()> {
    let orchestrator = BlockOrchestrator::new(config.time_slots())
        .with_default_reason(config.blocking.default_reason.clone());
    let slots = orchestrator.shared_slots();
    let mut store = build_store(&config, options.offline);
    let today = Local::now().date_naive();

    match options.mode {
        CliMode::Today => {
            print!("{}", render_calendar(config.ui.default_view, today, &mut store, &slots).await?);
        }
        CliMode::List => {
            store.refresh().await.context("Failed to fetch blocked slots")?;
            page(&format_upcoming(&store.upcoming(today, &slots)))?;
        }
        CliMode::Week(date) => {
            print!("{}", render_calendar(ViewType::Week, date, &mut store, &slots).await?);
        }
        CliMode::Month(date) => {
            print!("{}", render_calendar(ViewType::Month, date, &mut store, &slots).await?);
        }
        CliMode::Block(request) => {
            store.refresh().await.context("Failed to fetch blocked slots")?;
            let outcome = run_block(request, today, &orchestrator, &mut store).await?;
            println!("{}", outcome.summary());
            for failure in &outcome.failed {
                println!("  {}: {}", failure.key, failure.error);
            }
        }
        CliMode::Unblock(id) => {
            if run_unblock(&id, &orchestrator, &mut store).await? {
                println!("Removed blocked slot {}", id);
            } else {
                println!("Blocked slot {} was already removed", id);
            }
        }
        CliMode::ApplyRecurring => {
            if config.recurring.is_empty() {
                println!("No recurring blocks configured in {}", Config::config_path().display());
                return Ok(());
            }
            store.refresh().await.context("Failed to fetch blocked slots")?;
            let horizon = today
                .checked_add_months(Months::new(config.blocking.recurrence_horizon_months))
                .unwrap_or(today);
            let outcome = orchestrator
                .apply_recurring(&mut store, &config.recurring, DateRange::new(today, horizon))
                .await?;
            println!("{}", outcome.summary());
        }
    }

    Ok(())
}

/// Fetches the visible window of `view` around `date` and draws it.
pub async fn render_calendar(
    view: ViewType,
    date: NaiveDate,
    store: &mut BlockedSlotStore,
    slots: &TimeSlots,
) -> anyhow::Result<String> {
    let nav = CalendarNavigator::new(date, view);
    store.set_range_hint(Some(nav.visible_range()));
    store.refresh().await.context("Failed to fetch blocked slots")?;

    let window = nav.visible_dates();
    let grid = store.grid(slots, &window);
    Ok(match view {
        ViewType::Week => format_week(&grid),
        ViewType::Month => format_month(&grid),
    })
}

/// Removes the block with `id`. `false` when the refreshed cache no longer holds it.
async fn run_unblock(
    id: &str,
    orchestrator: &BlockOrchestrator,
    store: &mut BlockedSlotStore,
) -> anyhow::Result<bool> {
    store.refresh().await.context("Failed to fetch blocked slots")?;
    let Some(slot) = store
        .slots()
        .iter()
        .find(|slot| slot.id.as_deref() == Some(id))
        .cloned()
    else {
        tracing::info!("Blocked slot {} is not on the server", id);
        return Ok(false);
    };

    orchestrator.remove_block(store, &slot).await?;
    Ok(true)
}

/// Replays the request as the gesture an operator would make on screen, then confirms it.
async fn run_block(
    request: BlockRequest,
    today: NaiveDate,
    orchestrator: &BlockOrchestrator,
    store: &mut BlockedSlotStore,
) -> anyhow::Result<BatchOutcome> {
    let last = request.to.unwrap_or(request.from);

    let (view, first_cell, last_cell) = match &request.times {
        Some((start, end)) => {
            let week = DateRange::new(
                CalendarNavigator::week_start(request.from),
                CalendarNavigator::week_start(request.from) + Days::new(6),
            );
            if !week.contains(last) {
                bail!("A timed block must stay within the week of {}", request.from);
            }
            (
                ViewType::Week,
                SlotKey::timed(request.from, start),
                SlotKey::timed(last, end),
            )
        }
        None => (
            ViewType::Month,
            SlotKey::WholeDay(request.from),
            SlotKey::WholeDay(last),
        ),
    };

    let mut app = AppState::new(orchestrator.shared_slots(), view).with_today(today);
    app.navigator.jump_to(request.from);

    if view == ViewType::Month && request.to.is_none() {
        app.tap_day(request.from, store.slots());
    } else if app.pointer_down(first_cell, store.slots())? {
        app.pointer_enter(last_cell, store.slots())?;
        app.pointer_up();
    }

    let Some(gesture) = app.pending.as_ref().map(|p| p.gesture) else {
        bail!("Nothing to block: the selected slots are already blocked or in the past");
    };

    let outcome = app
        .confirm(gesture, orchestrator, store, request.reason.as_deref())
        .await?;
    outcome.context("Selection was no longer pending")
}

pub fn format_upcoming(upcoming: &BTreeMap<NaiveDate, Vec<&BlockedSlot>>) -> String {
    let mut lines = Vec::new();
    lines.push("Upcoming blocked slots".to_string());
    lines.push(String::new());

    if upcoming.is_empty() {
        lines.push("No blocked slots.".to_string());
    }

    for (date, blocks) in upcoming {
        let all_day = blocks.iter().any(|b| b.is_all_day());
        let header = date.format("%A, %B %d, %Y").to_string();
        if all_day {
            lines.push(format!("{} (whole day)", header));
        } else {
            lines.push(header);
        }
        for block in blocks {
            let time = block.time.as_deref().unwrap_or("All Day");
            let mut line = format!("  {:<8} {}", time, block.reason.as_deref().unwrap_or(""));
            if let Some(id) = &block.id {
                line.push_str(&format!(" [{}]", id));
            }
            lines.push(line.trim_end().to_string());
        }
    }

    lines.join("\n")
}

pub fn format_week(grid: &TimeGrid) -> String {
    let mut out = String::from("      ");
    for date in grid.window() {
        out.push_str(&format!(" {:<6}", date.format("%a%d").to_string()));
    }
    out.push('\n');

    for time in grid.slots().as_slice() {
        out.push_str(&format!("{:<6}", time));
        for date in grid.window() {
            let mark = if grid.is_blocked(*date, time) { '#' } else { '.' };
            out.push_str(&format!(" {:<6}", mark));
        }
        out.push('\n');
    }
    out
}

pub fn format_month(grid: &TimeGrid) -> String {
    let mut out = String::new();
    for date in grid.window() {
        let status = match grid.day_status(*date) {
            DayStatus::Open => "open",
            DayStatus::PartiallyBlocked => "partially blocked",
            DayStatus::Blocked => "blocked",
        };
        out.push_str(&format!("{:>2} {} {}\n", date.day(), date.format("%a"), status));
    }
    out
}

/// The pager to pipe into: `pager` (unset means `less`) when output goes to a terminal.
fn pager_command(pager: Option<&str>, interactive: bool) -> Option<Command> {
    if !interactive {
        return None;
    }
    let mut words = pager.unwrap_or("less").split_whitespace();
    let mut command = Command::new(words.next()?);
    command.args(words).stdin(Stdio::piped());
    Some(command)
}

fn page(text: &str) -> io::Result<()> {
    let pager = env::var("PAGER").ok();
    let Some(mut child) = pager_command(pager.as_deref(), io::stdout().is_terminal())
        .and_then(|mut command| command.spawn().ok())
    else {
        writeln!(io::stdout().lock(), "{text}")?;
        return Ok(());
    };

    if let Some(mut stdin) = child.stdin.take() {
        // Quitting the pager early closes the pipe.
        match stdin.write_all(text.as_bytes()) {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
            _ => {}
        }
    }
    child.wait()?;
    Ok(())
}
