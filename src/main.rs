use std::env;

use anyhow::{Context, Result};
use log::info;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use gnt::{ActFn, Adam, FeedForwardNet, Gnt, GntConfig, Optimizer};

const INPUT_DIM: usize = 4;
const BATCH: usize = 16;
const STEPS: usize = 50_000;
const SHIFT_EVERY: usize = 10_000;

/// Online regression against a target that shifts every `SHIFT_EVERY` steps,
/// showing how unit replacement keeps the network adapting.
fn main() -> Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read config '{path}'"))?;
            serde_json::from_str(&content).with_context(|| format!("invalid config '{path}'"))?
        }
        None => GntConfig {
            replacement_rate: 1e-3,
            maturity_threshold: 100,
            seed: Some(0),
            ..Default::default()
        },
    };

    let mut net = FeedForwardNet::new(&[INPUT_DIM, 32, 32, 1], ActFn::Relu, config.seed)?;
    let mut adam = Adam::with_defaults(&net, 0.01);
    let mut tracker = Gnt::new(&net, config)?;

    let mut rng = StdRng::seed_from_u64(12);
    let mut target = random_target(&mut rng);

    let mut running_loss = 0.0f32;
    for step in 1..=STEPS {
        if step % SHIFT_EVERY == 0 {
            target = random_target(&mut rng);
            info!("step {step}: target shifted");
        }

        let x = Array2::from_shape_fn((BATCH, INPUT_DIM), |_| rng.random_range(-1.0..1.0f32));
        let y = target_signal(&x, &target);

        net.forward(x.view())?;
        running_loss += net.backward(y.view())?;
        adam.step(&mut net)?;

        let features = net.hidden_activations().to_vec();
        tracker.gen_and_test(&mut net, &mut adam, &features)?;

        if step % 1000 == 0 {
            info!("step {step}: avg loss {:.5}", running_loss / 1000.);
            running_loss = 0.;
        }
    }

    Ok(())
}

fn random_target(rng: &mut StdRng) -> Vec<f32> {
    (0..INPUT_DIM).map(|_| rng.random_range(-2.0..2.0)).collect()
}

/// Nonlinear scalar target: a random linear map squashed through tanh.
fn target_signal(x: &Array2<f32>, target: &[f32]) -> Array2<f32> {
    let rows = x.nrows();
    Array2::from_shape_fn((rows, 1), |(r, _)| {
        let dot: f32 = x.row(r).iter().zip(target).map(|(a, b)| a * b).sum();
        dot.tanh()
    })
}
