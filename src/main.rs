use log::{error, info};
use single_drone_env::{DroneEnvironment, EnvConfig};

// Flies one hovering episode with a zero action and logs the outcome.
fn run() -> single_drone_env::Result<()> {
    let mut env = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            DroneEnvironment::from_yaml_config(path)?
        }
        None => DroneEnvironment::from_config(EnvConfig::default())?,
    };

    let width = env.action_space().size();
    let obs = env.reset()?;
    info!("Initial observation shape {:?}", obs.shape());

    let zero_action = vec![0.0; width];
    let mut total_reward = 0.0;
    let mut steps = 0u32;
    loop {
        let outcome = env.step(&zero_action)?;
        total_reward += outcome.reward;
        steps += 1;
        if outcome.done || outcome.info.time >= 2.0 {
            info!(
                "Stopped after {} steps at t={:.3}s, done={}, state {:?}",
                steps,
                outcome.info.time,
                outcome.done,
                env.state().position.as_slice()
            );
            break;
        }
    }
    info!("Total reward {:.3}", total_reward);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
