/// An LED color with each channel as a fraction in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Color {
    pub const OFF: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);

    pub const fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    /// Red grows with load while green fades: `rgb(cpu, 1 - cpu, 0)`.
    pub fn for_cpu_usage(cpu_usage: f64) -> Self {
        let cpu_usage = if cpu_usage.is_nan() {
            0.0
        } else {
            cpu_usage.clamp(0.0, 1.0)
        };

        Color::rgb(cpu_usage, 1.0 - cpu_usage, 0.0)
    }

    pub fn is_off(&self) -> bool {
        *self == Color::OFF
    }
}
