//! Analog integration of keyboard input
//!
//! Pure functions turning held/released keys into continuous axis and
//! trigger values: a clamped linear ramp while a direction is held and a
//! linear decay back to rest ("recoil") once it is released.

/// Step size for one update, `dt * speed`
///
/// A zero `dt` always yields a zero step, also for an unbounded speed.
pub fn step(dt: f32, speed: f32) -> f32 {
    if dt <= 0.0 || dt.is_nan() || speed.is_nan() {
        0.0
    } else {
        dt * speed
    }
}

/// Moves `value` linearly toward 0 by `amount` without crossing it
pub fn recoil(value: f32, amount: f32) -> f32 {
    if value > 0.0 {
        (value - amount).max(0.0)
    } else if value < 0.0 {
        (value + amount).min(0.0)
    } else {
        0.0
    }
}

/// Next value of an axis in `[-1, 1]`
pub fn advance(value: f32, held_positive: bool, held_negative: bool, dt: f32, speed: f32) -> f32 {
    let amount = step(dt, speed);
    let direction = held_positive as i8 - held_negative as i8;

    if direction == 0 {
        recoil(value, amount)
    } else {
        (value + direction as f32 * amount).clamp(-1.0, 1.0)
    }
}

/// Next value of an analog button in `[0, 1]`
pub fn advance_button(value: f32, held: bool, dt: f32, speed: f32) -> f32 {
    let amount = step(dt, speed);

    if held {
        (value + amount).min(1.0)
    } else {
        recoil(value, amount)
    }
}
