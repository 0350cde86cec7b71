//! Track two synthetic objects moving on straight lines.

use kftrack::{Observation, Tracker, TrackerParams};

fn main() {
    let mut tracker = Tracker::new(TrackerParams::default());

    for step in 0..30 {
        let t = step as f32 * 0.1;
        let frame = vec![
            Observation {
                position: [100.0 + 80.0 * t, 100.0, 0.0],
                width: 40.0,
                height: 60.0,
                ..Default::default()
            },
            Observation {
                position: [600.0 - 50.0 * t, 200.0 + 20.0 * t, 0.0],
                width: 30.0,
                height: 45.0,
                ..Default::default()
            },
        ];
        tracker.update(0.1, &frame);
    }

    for (id, state) in tracker.states() {
        println!(
            "track {id}: x={:.1} y={:.1} vx={:.1} vy={:.1}",
            state[0], state[1], state[2], state[3]
        );
    }
}
