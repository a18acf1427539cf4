//! Single pole low-pass filter

/// Low-pass filter on a noisy signal.
///
/// Each input moves the output a fraction `k` of the way towards it, so
/// `k = 1.0` disables filtering. The first input initialises the output.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    k: f32,
    output: Option<f32>,
}

impl LowPassFilter {
    pub fn new(k: f32) -> Self {
        Self { k, output: None }
    }

    pub fn put_input(&mut self, input: f32) {
        self.output = Some(match self.output {
            Some(prev) => prev * (1.0 - self.k) + input * self.k,
            None => input,
        });
    }

    /// Filtered output, zero before the first input.
    pub fn output(&self) -> f32 {
        self.output.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_filter() {
        let mut f = LowPassFilter::new(0.5);
        assert_eq!(f.output(), 0.0);

        f.put_input(0.0);
        for expected in &[-0.4, -0.6, -0.7, -0.75] {
            f.put_input(-0.8);
            assert!((f.output() - expected).abs() < 1e-6);
        }

        let mut unfiltered = LowPassFilter::new(1.0);
        unfiltered.put_input(3.0);
        unfiltered.put_input(-2.0);
        assert_eq!(unfiltered.output(), -2.0);
    }
}
