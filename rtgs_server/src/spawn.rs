//! Spawn policy: random initial placement for newly observed participants.

use rand::Rng;
use rtgs_shared::{
    config::SpawnBounds,
    math::Vec3,
    participant::{Participant, ParticipantKind},
};

/// Places new participants uniformly inside a bounded volume.
#[derive(Debug, Clone)]
pub struct SpawnPolicy {
    bounds: SpawnBounds,
    kind: ParticipantKind,
}

impl SpawnPolicy {
    pub fn new(bounds: SpawnBounds, kind: ParticipantKind) -> Self {
        Self { bounds, kind }
    }

    pub fn bounds(&self) -> &SpawnBounds {
        &self.bounds
    }

    /// Spawns a participant of the configured kind.
    pub fn spawn(&self, id: &str) -> Participant {
        spawn(id, self.kind.clone(), &self.bounds)
    }
}

/// Builds an active participant at a random integer location within `bounds`
/// with a random orientation in `[0, 360)`.
pub fn spawn(id: &str, kind: ParticipantKind, bounds: &SpawnBounds) -> Participant {
    let mut rng = rand::thread_rng();
    let location = Vec3::new(
        axis(&mut rng, bounds.min_x, bounds.max_x),
        axis(&mut rng, bounds.min_y, bounds.max_y),
        axis(&mut rng, bounds.min_z, bounds.max_z),
    );
    Participant {
        id: id.to_string(),
        kind,
        location,
        orientation: rng.gen_range(0.0..360.0),
        active: true,
    }
}

// Rounding can step outside non-integer bounds, so clamp afterwards.
fn axis(rng: &mut impl Rng, min: f32, max: f32) -> f32 {
    let v = if min < max { rng.gen_range(min..=max) } else { min };
    v.round().clamp(min, max)
}
