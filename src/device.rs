use anyhow::{Result, anyhow};

/// Device selection following the `-d/--device` convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceChoice {
    /// `-2`: first available GPU, falling back to whatever the GPU runtime offers.
    Auto,
    /// `-1`
    Cpu,
    /// `n >= 0`
    Gpu(usize),
}

impl DeviceChoice {
    pub fn from_index(index: i32) -> Result<Self> {
        match index {
            -2 => Ok(Self::Auto),
            -1 => Ok(Self::Cpu),
            n if n >= 0 => Ok(Self::Gpu(n as usize)),
            n => Err(anyhow!(
                "invalid device {n}: use -2 (auto), -1 (cpu) or a GPU index"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_indices() {
        assert_eq!(DeviceChoice::from_index(-2).unwrap(), DeviceChoice::Auto);
        assert_eq!(DeviceChoice::from_index(-1).unwrap(), DeviceChoice::Cpu);
        assert_eq!(DeviceChoice::from_index(3).unwrap(), DeviceChoice::Gpu(3));
        assert!(DeviceChoice::from_index(-3).is_err());
    }
}
