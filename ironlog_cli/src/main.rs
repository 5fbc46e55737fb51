use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use ironlog_core::draft::{self, DraftStore};
use ironlog_core::*;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ironlog")]
#[command(about = "Strength training log with planned progressions and PR tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Act as this lifter instead of the configured one
    #[arg(long, global = true)]
    user: Option<String>,

    /// More log output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the lift catalog
    Lifts,

    /// List programs with their weeks, days and blocks
    Programs,

    /// Enrol in a program, replacing the active one
    Assign {
        program: String,

        /// First day of the program (default: today)
        #[arg(long)]
        start: Option<NaiveDate>,
    },

    /// Stop the active program
    Unassign,

    /// Pause the active program
    Pause,

    /// Resume a paused program
    Resume { program: String },

    /// Start a session (default: next day of the active program)
    Start {
        /// Program day to train
        #[arg(long)]
        day: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// Start an empty session even when a program is active
        #[arg(long, conflicts_with = "day")]
        free: bool,
    },

    /// Show the session in progress and the next suggested weight (default)
    Status,

    /// Add an exercise to the session in progress
    Add {
        lift: String,

        /// Program block the exercise belongs to
        #[arg(long)]
        block: Option<String>,
    },

    /// Log a set locally; use `upload` or `finish` to send it
    Log {
        weight: f64,
        reps: u32,

        #[arg(long = "type", default_value = "working")]
        set_type: SetType,

        #[arg(long)]
        feedback: Option<Feedback>,

        /// Exercise number to switch to before logging
        #[arg(long)]
        exercise: Option<usize>,
    },

    /// Remove the last set of the current exercise
    Undo,

    /// Planned ramp and last performance for an exercise
    Suggest {
        /// Exercise number (default: current)
        #[arg(long)]
        exercise: Option<usize>,
    },

    /// Send locally logged sets to the store
    Upload,

    /// Upload pending sets and complete the session
    Finish,

    /// Throw away the session in progress
    Discard,

    /// Enter a manual or competition record
    Record {
        lift: String,
        weight: f64,
        reps: u32,

        #[arg(long, default_value = "manual")]
        source: RecordSource,

        /// Date of the lift (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Delete a manual record
    DeleteRecord { id: Uuid },

    /// Show personal records
    Prs {
        /// Only this lift, best per rep count
        lift: Option<String>,
    },

    /// Show completed sessions
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Export completed sessions to CSV
    Export { path: PathBuf },
}

struct Context {
    engine: Engine,
    drafts: JsonDraftStore,
    user: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    ironlog_core::logging::init_with_level(ironlog_core::logging::level_for_verbosity(cli.verbose));

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    let user = cli.user.unwrap_or_else(|| config.lifter.user_id.clone());

    let errors = get_default_catalog().validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    let mut ctx = Context {
        engine: Engine::open(&config),
        drafts: JsonDraftStore::new(config.data.data_dir.join("drafts")),
        user,
    };

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Lifts => cmd_lifts(&ctx),
        Commands::Programs => cmd_programs(&ctx),
        Commands::Assign { program, start } => cmd_assign(&ctx, &program, start),
        Commands::Unassign => {
            let assignment = ctx.engine.unassign_program(&ctx.user)?;
            println!("✓ Stopped {}", assignment.program_id);
            Ok(())
        }
        Commands::Pause => {
            let assignment = ctx.engine.pause_assignment(&ctx.user)?;
            println!("✓ Paused {}", assignment.program_id);
            Ok(())
        }
        Commands::Resume { program } => {
            let assignment = ctx.engine.resume_assignment(&ctx.user, &program)?;
            println!(
                "✓ Resumed {} at week {}, cycle {}",
                assignment.program_id, assignment.current_week_number, assignment.current_cycle
            );
            Ok(())
        }
        Commands::Start { day, title, free } => cmd_start(&mut ctx, day, title, free),
        Commands::Status => cmd_status(&mut ctx),
        Commands::Add { lift, block } => cmd_add(&mut ctx, &lift, block.as_deref()),
        Commands::Log {
            weight,
            reps,
            set_type,
            feedback,
            exercise,
        } => cmd_log(&mut ctx, weight, reps, set_type, feedback, exercise),
        Commands::Undo => cmd_undo(&mut ctx),
        Commands::Suggest { exercise } => cmd_suggest(&mut ctx, exercise),
        Commands::Upload => cmd_upload(&mut ctx).map(|_| ()),
        Commands::Finish => cmd_finish(&mut ctx),
        Commands::Discard => cmd_discard(&mut ctx),
        Commands::Record {
            lift,
            weight,
            reps,
            source,
            date,
        } => cmd_record(&ctx, &lift, weight, reps, source, date),
        Commands::DeleteRecord { id } => {
            let record = ctx.engine.delete_manual_record(&ctx.user, id)?;
            println!("✓ Deleted {} {} x {}", record.lift_id, record.weight, record.reps);
            Ok(())
        }
        Commands::Prs { lift } => cmd_prs(&ctx, lift.as_deref()),
        Commands::History { limit } => cmd_history(&ctx, limit),
        Commands::Export { path } => {
            let count = ctx.engine.export_history(&ctx.user, &path)?;
            println!("✓ Exported {} sets to {}", count, path.display());
            Ok(())
        }
    }
}

fn cmd_lifts(ctx: &Context) -> Result<()> {
    for lift in ctx.engine.lifts()? {
        match &lift.parent_lift_id {
            Some(parent) => println!("{:<20} {:<22} {:?} (variation of {})", lift.id, lift.name, lift.category, parent),
            None => println!("{:<20} {:<22} {:?}", lift.id, lift.name, lift.category),
        }
    }
    Ok(())
}

fn cmd_programs(ctx: &Context) -> Result<()> {
    for program in ctx.engine.programs()? {
        println!("{} - {} ({} weeks)", program.id, program.name, program.duration_weeks);
        for week in &program.weeks {
            println!("  Week {}", week.week_number);
            for day in &week.days {
                println!("    {}  {}", day.id, day.name);
                for (label, block) in day.labeled_blocks() {
                    let lifts: Vec<&str> = block.movements.iter().map(|m| m.lift_id.as_str()).collect();
                    let intensity = block
                        .intensity_percent()
                        .map(|p| format!(" up to {}%", p))
                        .unwrap_or_default();
                    println!(
                        "      {}. {} {}x{}{}",
                        label,
                        lifts.join(" + "),
                        block.sets,
                        block.reps,
                        intensity
                    );
                }
            }
        }
    }
    Ok(())
}

fn cmd_assign(ctx: &Context, program: &str, start: Option<NaiveDate>) -> Result<()> {
    let start = start.unwrap_or_else(|| Utc::now().date_naive());
    let assignment = ctx.engine.assign_program(&ctx.user, program, start)?;
    println!("✓ Assigned {} starting {}", assignment.program_id, assignment.start_date);
    Ok(())
}

fn cmd_start(ctx: &mut Context, day: Option<String>, title: Option<String>, free: bool) -> Result<()> {
    let day = match day {
        Some(day) => Some(day),
        None if free => None,
        None => ctx.engine.next_program_day(&ctx.user)?,
    };

    let session = ctx
        .engine
        .start_session(&ctx.user, day.as_deref(), title.as_deref())?;
    // A draft left over from an older session is replaced here
    let server = active_session(ctx)?;
    draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;

    println!("✓ Started {} ({})", session.title, session.id);
    if let Some(day) = &session.program_day_id {
        println!("  Day: {}", day);
    }
    println!("  {} exercises", session.exercises.len());
    Ok(())
}

fn cmd_status(ctx: &mut Context) -> Result<()> {
    let Some(server) = ctx.engine.active_session(&ctx.user)? else {
        println!("No session in progress.");
        if let Some(day) = ctx.engine.next_program_day(&ctx.user)? {
            println!("Next program day: {}", day);
        }
        return Ok(());
    };
    let draft = draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;
    display_draft(&draft);

    if let Some(suggestion) = draft.suggest_next_weight(draft.current_exercise_index, ctx.engine.planner()) {
        let total = suggestion.planned.len();
        println!();
        println!(
            "Next: {} (set {} of {})",
            suggestion.next_weight,
            suggestion.position.min(total as u32),
            total
        );
    }

    let pending = draft.pending_sets().len();
    if pending > 0 {
        println!("{} set(s) waiting for upload", pending);
    }
    Ok(())
}

fn cmd_add(ctx: &mut Context, lift: &str, block: Option<&str>) -> Result<()> {
    let server = active_session(ctx)?;
    let exercise = ctx
        .engine
        .add_exercise(&ctx.user, server.session_id, lift, block)?;

    let server = active_session(ctx)?;
    let draft = draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;
    let number = draft
        .exercises
        .iter()
        .position(|e| e.exercise_id == exercise.id)
        .map(|i| i + 1)
        .unwrap_or(draft.exercises.len());

    println!("✓ Added {} as exercise {}", exercise.lift_id, number);
    Ok(())
}

fn cmd_log(
    ctx: &mut Context,
    weight: f64,
    reps: u32,
    set_type: SetType,
    feedback: Option<Feedback>,
    exercise: Option<usize>,
) -> Result<()> {
    let server = active_session(ctx)?;
    let mut draft = draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;

    if let Some(number) = exercise {
        draft.select_exercise(exercise_index(number)?)?;
    }
    let lift_name = draft
        .current_exercise()
        .map(|e| e.lift_name.clone())
        .unwrap_or_default();
    draft.log_set(weight, reps, set_type, feedback)?;
    ctx.drafts.save(&ctx.user, &draft)?;

    println!("✓ {}: {} x {} ({})", lift_name, weight, reps, set_type);
    if let Some(suggestion) = draft.suggest_next_weight(draft.current_exercise_index, ctx.engine.planner()) {
        println!("  Next: {}", suggestion.next_weight);
    }
    Ok(())
}

fn cmd_undo(ctx: &mut Context) -> Result<()> {
    let server = active_session(ctx)?;
    let mut draft = draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;

    let Some(exercise) = draft.current_exercise() else {
        println!("Nothing to undo.");
        return Ok(());
    };
    let exercise_id = exercise.exercise_id;
    let Some(last) = exercise.sets.last() else {
        println!("Nothing to undo.");
        return Ok(());
    };

    if last.uploaded {
        ctx.engine
            .undo_last_set(&ctx.user, server.session_id, exercise_id)?;
    }
    if let Some(set) = draft.undo_last_set() {
        ctx.drafts.save(&ctx.user, &draft)?;
        println!("✓ Removed {} x {}", set.weight, set.reps);
    }
    Ok(())
}

fn cmd_suggest(ctx: &mut Context, exercise: Option<usize>) -> Result<()> {
    let server = active_session(ctx)?;
    let draft = draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;
    let index = match exercise {
        Some(number) => exercise_index(number)?,
        None => draft.current_exercise_index,
    };
    let exercise_id = draft
        .exercises
        .get(index)
        .map(|e| e.exercise_id)
        .ok_or_else(|| Error::Validation(format!("no exercise {}", index + 1)))?;

    let suggestions = ctx
        .engine
        .weight_suggestions(&ctx.user, server.session_id, exercise_id)?;
    let plan: Vec<String> = suggestions
        .suggestion
        .planned
        .iter()
        .map(|w| w.to_string())
        .collect();

    println!("{}", suggestions.lift_name);
    println!("  Start: {}", suggestions.suggestion.block_start);
    if let Some(target) = suggestions.suggestion.target {
        println!("  Target: {}", target);
    }
    println!("  Plan: {}", plan.join(" → "));
    println!("  Next: {}", suggestions.suggestion.next_weight);

    match suggestions.previous {
        Some(previous) => {
            let sets: Vec<String> = previous
                .sets
                .iter()
                .map(|s| format!("{}x{}", s.weight, s.reps))
                .collect();
            println!(
                "  Last time ({}): {}",
                previous.completed_at.format("%Y-%m-%d"),
                sets.join(", ")
            );
        }
        None => println!("  No recent history for this block"),
    }
    Ok(())
}

/// Send pending sets; the draft keeps them if the upload fails
fn cmd_upload(ctx: &mut Context) -> Result<usize> {
    let server = active_session(ctx)?;
    let mut draft = draft::load_reconciled(&mut ctx.drafts, &ctx.user, &server)?;

    let pending = draft.pending_sets();
    if pending.is_empty() {
        println!("Nothing to upload.");
        return Ok(0);
    }

    let result = ctx
        .engine
        .batch_upload_sets(&ctx.user, server.session_id, &pending)?;
    draft.mark_uploaded();
    ctx.drafts.save(&ctx.user, &draft)?;

    println!("✓ Uploaded {} set(s)", result.uploaded);
    for pr in &result.prs {
        match pr.previous_best {
            Some(previous) => println!(
                "  🏆 New PR: {} {} x {} (previous {})",
                pr.lift_name, pr.weight, pr.reps, previous
            ),
            None => println!("  🏆 New PR: {} {} x {}", pr.lift_name, pr.weight, pr.reps),
        }
    }
    Ok(result.uploaded)
}

fn cmd_finish(ctx: &mut Context) -> Result<()> {
    cmd_upload(ctx)?;
    let server = active_session(ctx)?;

    let completion = ctx.engine.complete_session(&ctx.user, server.session_id)?;
    ctx.drafts.clear(&ctx.user)?;

    let sets: usize = completion.session.exercises.iter().map(|e| e.sets.len()).sum();
    println!("✓ Completed {} ({} sets)", completion.session.title, sets);
    if completion.advanced {
        if let (Some(week), Some(cycle)) = (completion.new_week_number, completion.new_cycle) {
            println!("  Program advanced to week {}, cycle {}", week, cycle);
        }
    }
    Ok(())
}

fn cmd_discard(ctx: &mut Context) -> Result<()> {
    let server = active_session(ctx)?;
    let session = ctx.engine.discard_session(&ctx.user, server.session_id)?;
    ctx.drafts.clear(&ctx.user)?;
    println!("✓ Discarded {}", session.title);
    Ok(())
}

fn cmd_record(
    ctx: &Context,
    lift: &str,
    weight: f64,
    reps: u32,
    source: RecordSource,
    date: Option<NaiveDate>,
) -> Result<()> {
    let date = match date {
        Some(day) => day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| Error::Validation(format!("invalid date {}", day)))?,
        None => Utc::now(),
    };
    let record = ctx
        .engine
        .record_manual(&ctx.user, lift, weight, reps, source, date)?;
    println!(
        "✓ Recorded {} {} x {} (e1RM {}) [{}]",
        record.lift_id, record.weight, record.reps, record.estimated_one_rep_max, record.id
    );
    Ok(())
}

fn cmd_prs(ctx: &Context, lift: Option<&str>) -> Result<()> {
    let records = match lift {
        Some(lift) => ctx.engine.bests_by_reps(&ctx.user, lift)?,
        None => ctx.engine.all_records(&ctx.user)?,
    };
    if records.is_empty() {
        println!("No records yet.");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {:<20} {:>7} x {:<2} e1RM {:<7} {:<11} {}",
            record.date.format("%Y-%m-%d"),
            record.lift_id,
            record.weight,
            record.reps,
            record.estimated_one_rep_max,
            record.source,
            record.id
        );
    }
    Ok(())
}

fn cmd_history(ctx: &Context, limit: usize) -> Result<()> {
    let sessions = ctx.engine.completed_sessions(&ctx.user)?;
    if sessions.is_empty() {
        println!("No completed sessions.");
        return Ok(());
    }
    for session in sessions.iter().take(limit) {
        let date = session
            .completed_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{}  {}", date, session.title);
        for exercise in &session.exercises {
            let sets: Vec<String> = exercise
                .sets
                .iter()
                .map(|s| format!("{}x{}", s.weight, s.reps))
                .collect();
            if !sets.is_empty() {
                println!("    {:<20} {}", exercise.lift_id, sets.join(", "));
            }
        }
    }
    Ok(())
}

fn active_session(ctx: &Context) -> Result<ActiveSession> {
    ctx.engine
        .active_session(&ctx.user)?
        .ok_or_else(|| Error::NotFound("no session in progress".into()))
}

/// 1-based exercise number from the command line
fn exercise_index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| Error::Validation("exercises are numbered from 1".into()))
}

fn display_draft(draft: &LocalSessionData) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", draft.title);
    println!("╰─────────────────────────────────────────╯");
    println!();

    for (i, exercise) in draft.exercises.iter().enumerate() {
        let marker = if i == draft.current_exercise_index { "→" } else { " " };
        let names: Vec<String> = if exercise.movements.len() > 1 {
            exercise
                .movements
                .iter()
                .map(|m| format!("{} {}", m.reps(), m.lift_name))
                .collect()
        } else {
            vec![exercise.lift_name.clone()]
        };
        let intensity = exercise
            .up_to_percent
            .map(|p| format!(" up to {}%", p))
            .unwrap_or_default();
        println!(
            "{} {}. {}  {}x{}{}",
            marker,
            i + 1,
            names.join(" + "),
            exercise.target_sets,
            exercise.target_reps,
            intensity
        );

        for set in &exercise.sets {
            let feedback = set.feedback.map(|f| format!(" ({})", f)).unwrap_or_default();
            let pending = if set.uploaded { "" } else { " *" };
            println!("      {} x {} {}{}{}", set.weight, set.reps, set.set_type, feedback, pending);
        }
    }
}
