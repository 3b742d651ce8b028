use std::process::ExitCode;

use rbdx_cli::{solve_scene, Scene};

fn usage() {
    eprintln!("usage: rbdx-cli solve <scene.json>");
}

fn main() -> ExitCode {
    rbdx_solver::init_logger_with_level(tracing::Level::WARN);

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 || args[1] != "solve" {
        usage();
        return ExitCode::from(2);
    }

    let scene = match Scene::from_file(&args[2]) {
        Ok(scene) => scene,
        Err(err) => {
            eprintln!("load error: {err}");
            return ExitCode::from(1);
        }
    };

    let report = match solve_scene(&scene) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("solve error: {err}");
            return ExitCode::from(1);
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("report error: {err}");
            ExitCode::from(1)
        }
    }
}
