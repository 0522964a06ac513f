pub fn epsilon_eq(a: f32, b: f32, epsilon: f32) -> bool {
    let diff = a - b;
    diff < epsilon && diff > -epsilon
}

pub fn assert_epsilon_eq(a: f32, b: f32, epsilon: f32) {
    assert!(
        epsilon_eq(a, b, epsilon),
        "expected {} and {} to be within {}",
        a,
        b,
        epsilon
    );
}
