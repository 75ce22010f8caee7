//! chill CLI: terminal focus timer powered by chill-core.
//!
//! Commands:
//!   chill list [animations|sounds]            List media (no payloads)
//!   chill import <path>                       Import a file or directory
//!   chill add-url <collection> <name> <url>   Store an external URL
//!   chill delete <collection> <id>            Delete a media record
//!   chill presets                             List presets
//!   chill preset-add <name> <sound-id>...     Create a preset
//!   chill preset-delete <id>                  Delete a preset
//!   chill sessions                            List saved sessions
//!   chill session-save <name> [focus flags]   Save a configuration
//!   chill session-delete <id>                 Delete a saved session
//!   chill cache                               Cache occupancy
//!   chill focus [flags]                       Run the timer with a sound mix

use std::io::Write;
use std::path::Path;

use chill_core::{
    format_clock, AnimationKind, Collection, Engine, EngineSnapshot, Mode, SoundTrack,
};
use nine_s_shell::Shell;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return;
    }

    // 9S root defaults to ~/.chillpomodoro
    if std::env::var("NINE_S_ROOT").is_err() {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        let root = format!("{}/.chillpomodoro", home);
        std::fs::create_dir_all(&root).ok();
        std::env::set_var("NINE_S_ROOT", &root);
    }

    let shell = match Shell::open("chillpomodoro", &[]) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("failed to open 9S shell: {}", e);
            std::process::exit(1);
        }
    };
    let engine = Engine::new(shell);

    match args[0].as_str() {
        "list" => cmd_list(&engine, &args[1..]),
        "import" => cmd_import(&engine, &args[1..]),
        "add-url" => cmd_add_url(&engine, &args[1..]),
        "delete" => cmd_delete(&engine, &args[1..]),
        "presets" => cmd_presets(&engine),
        "preset-add" => cmd_preset_add(&engine, &args[1..]),
        "preset-delete" => cmd_preset_delete(&engine, &args[1..]),
        "sessions" => cmd_sessions(&engine),
        "session-save" => cmd_session_save(&engine, &args[1..]),
        "session-delete" => cmd_session_delete(&engine, &args[1..]),
        "cache" => cmd_cache(&engine),
        "focus" => cmd_focus(&engine, &args[1..]),
        other => {
            eprintln!("unknown command: {}", other);
            print_usage();
        }
    }

    engine.shutdown();
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

fn cmd_list(engine: &Engine, args: &[String]) {
    let collections = match args.first() {
        Some(name) => match Collection::parse(name) {
            Some(c) => vec![c],
            None => {
                eprintln!("unknown collection: {}", name);
                return;
            }
        },
        None => vec![Collection::Animations, Collection::Sounds],
    };

    for collection in collections {
        let items = engine.list_media(collection);
        println!("{} ({})", collection, items.len());
        for item in items {
            let detail = match (item.kind, item.volume) {
                (Some(kind), _) => format!("{:?}", kind).to_lowercase(),
                (None, Some(volume)) => format!("vol {:.0}%", volume * 100.0),
                (None, None) => String::new(),
            };
            println!("  {:<16} {:<32} {}", item.id, item.name, detail);
        }
    }
}

fn cmd_import(engine: &Engine, args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: chill import <path>");
        return;
    }
    match engine.import(Path::new(&args[0])) {
        Ok(records) => {
            for record in &records {
                println!("  + {} {}", record.id, record.name);
            }
            println!("imported {} item(s)", records.len());
        }
        Err(e) => eprintln!("import failed: {}", e),
    }
}

fn cmd_add_url(engine: &Engine, args: &[String]) {
    if args.len() < 3 {
        eprintln!("usage: chill add-url <animations|sounds> <name> <url> [gif|video|image]");
        return;
    }
    let collection = match Collection::parse(&args[0]) {
        Some(c) => c,
        None => {
            eprintln!("unknown collection: {}", args[0]);
            return;
        }
    };
    let kind = match args.get(3) {
        Some(k) => match AnimationKind::parse(k) {
            Some(kind) => Some(kind),
            None => {
                eprintln!("unknown animation type: {}", k);
                return;
            }
        },
        None => None,
    };
    match engine.add_url(collection, &args[1], &args[2], kind) {
        Ok(record) => println!("added {} ({})", record.id, record.name),
        Err(e) => eprintln!("add failed: {}", e),
    }
}

fn cmd_delete(engine: &Engine, args: &[String]) {
    if args.len() < 2 {
        eprintln!("usage: chill delete <animations|sounds> <id>");
        return;
    }
    let collection = match Collection::parse(&args[0]) {
        Some(c) => c,
        None => {
            eprintln!("unknown collection: {}", args[0]);
            return;
        }
    };
    match engine.delete_media(collection, &args[1]) {
        Ok(true) => println!("deleted {}", args[1]),
        Ok(false) => eprintln!("no such record: {}", args[1]),
        Err(e) => eprintln!("delete failed: {}", e),
    }
}

fn cmd_cache(engine: &Engine) {
    let stats = engine.cache_stats();
    println!(
        "animations: {}  sounds: {}  payload: {} KiB",
        stats.animations,
        stats.sounds,
        stats.payload_bytes / 1024
    );
}

// ---------------------------------------------------------------------------
// Presets & sessions
// ---------------------------------------------------------------------------

fn cmd_presets(engine: &Engine) {
    match engine.presets() {
        Ok(presets) => {
            for preset in presets {
                println!("  {:<16} {:<24} {}", preset.id, preset.name, preset.sound_ids.join(", "));
            }
        }
        Err(e) => eprintln!("cannot read presets: {}", e),
    }
}

fn cmd_preset_add(engine: &Engine, args: &[String]) {
    if args.len() < 2 {
        eprintln!("usage: chill preset-add <name> <sound-id>...");
        return;
    }
    match engine.add_preset(&args[0], args[1..].to_vec()) {
        Ok(preset) => println!("added preset {} ({})", preset.id, preset.name),
        Err(e) => eprintln!("preset failed: {}", e),
    }
}

fn cmd_preset_delete(engine: &Engine, args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: chill preset-delete <id>");
        return;
    }
    match engine.delete_preset(&args[0]) {
        Ok(true) => println!("deleted preset {}", args[0]),
        Ok(false) => eprintln!("no such preset: {}", args[0]),
        Err(e) => eprintln!("delete failed: {}", e),
    }
}

fn cmd_sessions(engine: &Engine) {
    match engine.sessions() {
        Ok(sessions) => {
            for s in sessions {
                println!(
                    "  {:<16} {:<24} {}/{} min  {} track(s)",
                    s.id,
                    s.name,
                    s.work_time,
                    s.break_time,
                    s.sound_tracks.len()
                );
            }
        }
        Err(e) => eprintln!("cannot read sessions: {}", e),
    }
}

fn cmd_session_save(engine: &Engine, args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: chill session-save <name> [focus flags]");
        return;
    }
    let plan = match FocusPlan::parse(&args[1..]) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };
    if let Err(e) = plan.apply(engine) {
        eprintln!("{}", e);
        return;
    }
    match engine.save_session(&args[0]) {
        Ok(session) => println!("saved session {} ({})", session.id, session.name),
        Err(e) => eprintln!("save failed: {}", e),
    }
}

fn cmd_session_delete(engine: &Engine, args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: chill session-delete <id>");
        return;
    }
    match engine.delete_session(&args[0]) {
        Ok(true) => println!("deleted session {}", args[0]),
        Ok(false) => eprintln!("no such session: {}", args[0]),
        Err(e) => eprintln!("delete failed: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Focus
// ---------------------------------------------------------------------------

/// Configuration assembled from `focus` / `session-save` flags.
#[derive(Default)]
struct FocusPlan {
    session: Option<String>,
    work: Option<u32>,
    brk: Option<u32>,
    tracks: Vec<SoundTrack>,
    background: Option<String>,
    cycles: u32,
}

impl FocusPlan {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut plan = FocusPlan {
            cycles: 1,
            ..FocusPlan::default()
        };
        let mut it = args.iter();
        while let Some(flag) = it.next() {
            let mut value = || {
                it.next()
                    .cloned()
                    .ok_or_else(|| format!("{} needs a value", flag))
            };
            match flag.as_str() {
                "--session" => plan.session = Some(value()?),
                "--work" => plan.work = Some(parse_minutes(&value()?)?),
                "--break" => plan.brk = Some(parse_minutes(&value()?)?),
                "--background" => plan.background = Some(value()?),
                "--cycles" => {
                    plan.cycles = value()?
                        .parse()
                        .map_err(|_| "--cycles takes a number".to_string())?
                }
                "--sound" => {
                    let (id, volume) = split_volume(&value()?)?;
                    let slot = format!("t{}", plan.tracks.len() + 1);
                    plan.tracks.push(SoundTrack::single(slot, id, volume));
                }
                "--preset" => {
                    let (id, volume) = split_volume(&value()?)?;
                    let slot = format!("t{}", plan.tracks.len() + 1);
                    plan.tracks.push(SoundTrack::preset(slot, id, volume));
                }
                other => return Err(format!("unknown flag: {}", other)),
            }
        }
        Ok(plan)
    }

    /// Session first, then explicit flags on top of it.
    fn apply(&self, engine: &Engine) -> Result<(), String> {
        if let Some(id) = &self.session {
            engine.load_session(id).map_err(|e| e.to_string())?;
        }
        if let Some(minutes) = self.work {
            engine.set_work_minutes(minutes).map_err(|e| e.to_string())?;
        }
        if let Some(minutes) = self.brk {
            engine.set_break_minutes(minutes).map_err(|e| e.to_string())?;
        }
        if !self.tracks.is_empty() {
            engine.set_tracks(self.tracks.clone());
        }
        if let Some(id) = &self.background {
            if engine.select_background(Some(id)).is_none() {
                log::warn!("background {} not found", id);
            }
        }
        Ok(())
    }
}

fn cmd_focus(engine: &Engine, args: &[String]) {
    let plan = match FocusPlan::parse(args) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };
    if let Err(e) = plan.apply(engine) {
        eprintln!("{}", e);
        return;
    }

    let rx = engine.subscribe();
    engine.start();
    engine.start_timer();

    // One cycle is a work interval plus a break.
    let mut intervals_left = plan.cycles.max(1) * 2;
    let mut last_mode = engine.snapshot().timer.mode;
    let mut was_notice = false;

    for snap in rx.iter() {
        print_status(&snap);

        if snap.timer.mode != last_mode {
            println!();
            println!("{} finished", last_mode.as_str());
            last_mode = snap.timer.mode;
            intervals_left = intervals_left.saturating_sub(1);
            if intervals_left == 0 {
                break;
            }
            if !snap.timer.is_break_notice {
                engine.start_timer();
            }
        } else if was_notice && !snap.timer.is_break_notice && !snap.timer.is_running {
            engine.start_timer();
        }
        was_notice = snap.timer.is_break_notice;
    }
    println!();
}

fn print_status(snap: &EngineSnapshot) {
    let label = match snap.timer.mode {
        Mode::Work => "FOCUS",
        Mode::Break => "BREAK",
    };
    let state = if snap.timer.is_break_notice {
        format!("time for a break ({})", snap.timer.break_countdown)
    } else if snap.timer.is_running {
        "running".to_string()
    } else {
        "paused".to_string()
    };
    print!(
        "\r  {} {}  {}  sounds: {}    ",
        label,
        format_clock(snap.timer.time_left),
        state,
        snap.playing_keys.len(),
    );
    std::io::stdout().flush().ok();
}

fn parse_minutes(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(m) if m > 0 => Ok(m),
        _ => Err(format!("invalid minutes: {}", s)),
    }
}

/// `ID` or `ID:VOL`, VOL in 0..=100.
fn split_volume(s: &str) -> Result<(String, f32), String> {
    match s.rsplit_once(':') {
        Some((id, vol)) => {
            let pct: f32 = vol.parse().map_err(|_| format!("invalid volume: {}", vol))?;
            Ok((id.to_string(), (pct / 100.0).clamp(0.0, 1.0)))
        }
        None => Ok((s.to_string(), 1.0)),
    }
}

fn print_usage() {
    println!("chill - terminal focus timer");
    println!();
    println!("usage: chill <command> [args]");
    println!();
    println!("commands:");
    println!("  list [animations|sounds]             List media");
    println!("  import <path>                        Import a file or directory");
    println!("  add-url <collection> <name> <url> [type]");
    println!("                                       Store an external URL");
    println!("  delete <collection> <id>             Delete a media record");
    println!("  presets                              List presets");
    println!("  preset-add <name> <sound-id>...      Create a preset");
    println!("  preset-delete <id>                   Delete a preset");
    println!("  sessions                             List saved sessions");
    println!("  session-save <name> [focus flags]    Save a configuration");
    println!("  session-delete <id>                  Delete a saved session");
    println!("  cache                                Cache occupancy");
    println!("  focus [flags]                        Run the timer");
    println!();
    println!("focus flags:");
    println!("  --session <id>         Start from a saved session");
    println!("  --work <min>           Work length (15, 25, 30, 45, 60, 90)");
    println!("  --break <min>          Break length (5, 10, 15, 20, 30)");
    println!("  --sound <id[:vol]>     Add a sound track, vol 0-100");
    println!("  --preset <id[:vol]>    Add a preset track, vol 0-100");
    println!("  --background <id>      Select a background animation");
    println!("  --cycles <n>           Work/break cycles to run (default 1)");
}
