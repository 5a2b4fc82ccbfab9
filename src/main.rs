use dual_arm_playback::trajectory::Recording;
use dual_arm_playback::{Params, PlaybackSession, Rig, RigConfig, ShutdownSignal};
use std::env;
use std::error::Error;
use std::io;
use std::thread;

const USAGE: &str =
    "Usage: dual_arm_playback <recording.csv> [--rig rig.json] [--params params.json] [--loops N]";

struct Options {
    recording: String,
    rig: Option<String>,
    params: Option<String>,
    /// 0 replays until interrupted.
    loops: u32,
}

fn parse_args(args: &[String]) -> Result<Options, Box<dyn Error>> {
    let mut recording = None;
    let mut rig = None;
    let mut params = None;
    let mut loops = 1;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rig" => rig = Some(iter.next().ok_or(USAGE)?.clone()),
            "--params" => params = Some(iter.next().ok_or(USAGE)?.clone()),
            "--loops" | "-l" => loops = iter.next().ok_or(USAGE)?.parse()?,
            "--help" | "-h" => return Err(USAGE.into()),
            path if recording.is_none() => recording = Some(path.to_string()),
            other => return Err(format!("unexpected argument {other}\n{USAGE}").into()),
        }
    }

    Ok(Options {
        recording: recording.ok_or(USAGE)?,
        rig,
        params,
        loops,
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let opts = parse_args(&args[1..])?;

    println!("Loading recording from {}...", opts.recording);
    let recording = Recording::from_path(&opts.recording)?;
    println!(
        "  {} rows, {:.1}s, {} left / {} right joints",
        recording.rows.len(),
        recording.duration(),
        recording.left_joints.len(),
        recording.right_joints.len()
    );

    let params = match &opts.params {
        Some(path) => Params::from_path(path)?,
        None => Params::default(),
    };

    let rig = match &opts.rig {
        Some(path) => Rig::from_config(&RigConfig::from_path(path)?)?,
        None => {
            println!("No rig given, playing back on a simulated robot.");
            Rig::simulated(
                recording.left_joints.clone(),
                recording.right_joints.clone(),
                50.0,
            )
        }
    };

    // Spawn thread to listen for interrupt
    let shutdown = ShutdownSignal::new();
    let handle = shutdown.clone();
    thread::spawn(move || {
        let mut s = String::new();
        io::stdin().read_line(&mut s).ok();
        handle.trigger();
    });

    println!("Playback started. Press ENTER to stop early.");

    let mut last_ok = true;
    let mut loop_cnt = 1;
    while opts.loops == 0 || loop_cnt <= opts.loops {
        if opts.loops == 0 {
            println!("Playback loop {} (until interrupted)", loop_cnt);
        } else {
            println!("Playback loop {} of {}", loop_cnt, opts.loops);
        }

        let mut session = PlaybackSession::connect(rig.clone(), params.clone(), shutdown.clone())?;
        session.load(&recording)?;

        if session.start()? {
            last_ok = session.wait();
        } else {
            session.stop();
            last_ok = false;
        }

        if shutdown.is_triggered() {
            println!("Playback interrupted by user.");
            session.stop();
            last_ok = false;
            break;
        }
        if !last_ok {
            println!("Playback loop {} failed.", loop_cnt);
        }
        loop_cnt += 1;
    }

    if !last_ok {
        return Err("trajectory playback did not complete".into());
    }
    println!("Exiting - file playback complete.");
    Ok(())
}
