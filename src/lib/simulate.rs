use crate::player::{BattingCounts, PlayerRecord};
use crate::prior::FittedPrior;
use anyhow::{anyhow, Result};
use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta as BetaSampler, Binomial, Distribution};
use serde::Serialize;

/// A player with a known true batting average and hits drawn from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedRecord {
    pub player_id: String,
    pub at_bats: u64,
    pub true_p: f64,
    pub hits: u64,
}

impl BattingCounts for SimulatedRecord {
    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn hits(&self) -> u64 {
        self.hits
    }

    fn at_bats(&self) -> u64 {
        self.at_bats
    }

    fn true_p(&self) -> Option<f64> {
        Some(self.true_p)
    }
}

/// Draw `true_p ~ Beta(prior for the player's at-bats)` and
/// `hits ~ Binomial(at_bats, true_p)` for every player.
///
/// The random stream is fully determined by `seed`.
pub fn simulate(
    players: &[PlayerRecord],
    prior: &FittedPrior,
    seed: u64,
) -> Result<Vec<SimulatedRecord>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut simulated = Vec::with_capacity(players.len());
    for player in players {
        let beta = prior.beta_for(player.at_bats);
        let sampler = BetaSampler::new(beta.alpha, beta.beta).map_err(|e| {
            anyhow!(
                "Cannot sample Beta({}, {}) for player {}: {}",
                beta.alpha,
                beta.beta,
                player.player_id,
                e
            )
        })?;
        // A draw can round to exactly 0 or 1 in floating point
        let true_p = sampler
            .sample(&mut rng)
            .clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
        let binomial = Binomial::new(player.at_bats, true_p)
            .map_err(|e| anyhow!("Cannot sample hits for player {}: {}", player.player_id, e))?;
        let hits = binomial.sample(&mut rng);
        simulated.push(SimulatedRecord {
            player_id: player.player_id.clone(),
            at_bats: player.at_bats,
            true_p,
            hits,
        });
    }
    debug!(
        "Simulated {} players with seed {}, mean true average {:.4}",
        simulated.len(),
        seed,
        simulated.iter().map(|r| r.true_p).sum::<f64>() / simulated.len().max(1) as f64
    );
    Ok(simulated)
}
