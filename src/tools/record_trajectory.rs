use dual_arm_playback::robot::{GripperKind, Rig};
use dual_arm_playback::trajectory::{LEFT_GRIPPER, RIGHT_GRIPPER, Side};
use dual_arm_playback::RigConfig;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::stdout;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};

const USAGE: &str = "Usage: record_trajectory [output.csv] --rig rig.json [--rate HZ]";

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let mut filename = "data/recording.csv".to_string();
    let mut rig_path = None;
    let mut rate_hz = 100.0;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rig" => rig_path = Some(iter.next().ok_or(USAGE)?.clone()),
            "--rate" => rate_hz = iter.next().ok_or(USAGE)?.parse()?,
            other => filename = other.to_string(),
        }
    }
    let rig_path = rig_path.ok_or(USAGE)?;
    if !(rate_hz > 0.0) {
        return Err("rate must be positive".into());
    }

    let rig = Rig::from_config(&RigConfig::from_path(&rig_path)?)?;

    // Disable torque so the arms can be moved by hand
    for side in Side::BOTH {
        rig.arm(side).limb.set_torque(false)?;
    }
    println!("Rig initialized and arm torque disabled.");

    let left_joints = rig.left.limb.joint_names();
    let right_joints = rig.right.limb.joint_names();

    // Setup terminal for raw input (to detect spacebar without Enter)
    stdout().execute(crossterm::cursor::Hide)?;
    enable_raw_mode()?;

    println!("Press SPACE to START recording, ESC to quit.\r");

    // wait for start
    loop {
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char(' ') => break,
                KeyCode::Esc => {
                    cleanup()?;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    println!("Recording started... Press SPACE to STOP.\r");

    let mut rows: Vec<Vec<String>> = Vec::new();
    let start_time = Instant::now();
    let target_frame_time = Duration::from_secs_f64(1.0 / rate_hz);

    loop {
        let frame_start = Instant::now();

        // Check for stop condition (non-blocking)
        if event::poll(Duration::ZERO)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && key.code == KeyCode::Char(' ')
        {
            break;
        }

        let mut row = vec![format!("{:.4}", start_time.elapsed().as_secs_f64())];
        for (side, joints) in [(Side::Left, &left_joints), (Side::Right, &right_joints)] {
            let limb = &rig.arm(side).limb;
            row.extend(joints.iter().map(|j| cell(limb.joint_angle(j))));
        }
        for side in Side::BOTH {
            let gripper = &rig.arm(side).gripper;
            // Custom grippers have no position; record them closed so the
            // column stays complete.
            let position = match gripper.kind() {
                GripperKind::Standard => gripper.position().ok(),
                GripperKind::Custom => Some(0.0),
            };
            row.push(cell(position));
        }
        rows.push(row);

        // Maintain sample rate
        let elapsed = frame_start.elapsed();
        if elapsed < target_frame_time {
            thread::sleep(target_frame_time - elapsed);
        }
    }

    cleanup()?;

    println!("Saving {} rows to {}...", rows.len(), filename);

    let file = File::create(&filename)?;
    let mut wtr = csv::Writer::from_writer(file);

    let mut header = vec!["time".to_string()];
    header.extend(left_joints.iter().cloned());
    header.extend(right_joints.iter().cloned());
    header.push(LEFT_GRIPPER.to_string());
    header.push(RIGHT_GRIPPER.to_string());
    wtr.write_record(&header)?;

    for row in rows {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;

    println!("Done.");
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

fn cleanup() -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    stdout().execute(crossterm::cursor::Show)?;
    Ok(())
}
