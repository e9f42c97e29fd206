use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crop {
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gravity {
    Center,
}

/// Resize applied to every listing image before it is stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformProfile {
    pub width: u32,
    pub height: u32,
    pub crop: Crop,
    pub gravity: Gravity,
    pub folder: String,
}

impl TransformProfile {
    pub fn fill_center(width: u32, height: u32, folder: impl Into<String>) -> Self {
        Self {
            width,
            height,
            crop: Crop::Fill,
            gravity: Gravity::Center,
            folder: folder.into(),
        }
    }

    /// Cloudinary transformation string, e.g. `c_fill,g_center,h_630,w_1200`.
    pub fn to_transformation(&self) -> String {
        let crop = match self.crop {
            Crop::Fill => "fill",
        };
        let gravity = match self.gravity {
            Gravity::Center => "center",
        };
        format!("c_{},g_{},h_{},w_{}", crop, gravity, self.height, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformation_string() {
        let profile = TransformProfile::fill_center(1200, 630, "listings");
        assert_eq!(profile.to_transformation(), "c_fill,g_center,h_630,w_1200");
    }
}
