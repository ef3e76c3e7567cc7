use std::fmt;

/// Human-readable description of the active backend, one field per line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiInfo {
    pub backend: String,
    pub adapter: String,
    pub driver: String,
    pub version: String,
    pub memory: String,
    pub max_texture_size: String,
    pub depth_buffer: String,
}

impl ApiInfo {
    pub const LINES: usize = 7;

    pub fn lines(&self) -> [&str; Self::LINES] {
        [
            self.backend.as_str(),
            self.adapter.as_str(),
            self.driver.as_str(),
            self.version.as_str(),
            self.memory.as_str(),
            self.max_texture_size.as_str(),
            self.depth_buffer.as_str(),
        ]
    }
}

impl fmt::Display for ApiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines().into_iter().filter(|l| !l.is_empty()) {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// "Video memory: X MB total, Y free" from kilobyte counts. `None` when the
/// driver reported nothing usable.
pub fn memory_line(total_kb: i32, free_kb: i32) -> Option<String> {
    if total_kb <= 0 || free_kb <= 0 {
        return None;
    }
    let total = total_kb as f32 / 1024.0;
    let free = free_kb as f32 / 1024.0;
    Some(format!("Video memory: {total:.2} MB total, {free:.2} free"))
}

#[cfg(test)]
mod tests {
    use super::{ApiInfo, memory_line};

    #[test]
    fn memory_line_formats_megabytes() {
        assert_eq!(
            memory_line(2_097_152, 1_048_576).as_deref(),
            Some("Video memory: 2048.00 MB total, 1024.00 free")
        );
        assert_eq!(memory_line(0, 10), None);
        assert_eq!(memory_line(10, -1), None);
    }

    #[test]
    fn display_skips_blank_lines() {
        let info = ApiInfo {
            backend: "-- Using OpenGL (64 bit) --".into(),
            adapter: "Vendor: Test".into(),
            ..ApiInfo::default()
        };
        assert_eq!(info.to_string(), "-- Using OpenGL (64 bit) --\nVendor: Test\n");
        assert_eq!(info.lines().len(), ApiInfo::LINES);
    }
}
