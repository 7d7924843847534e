use serde::{Deserialize, Serialize};

/// How sprite draws reach the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteMode {
    /// Push constants when the device supports them, instancing otherwise.
    #[default]
    Auto,
    /// One draw per sprite with its data in push constants.
    PushConstants,
    /// Sprites sharing a sheet are batched into one instanced draw.
    Instanced,
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Clear colour, linear RGBA.
    pub clear_color: [f64; 4],
    pub sprite_mode: SpriteMode,
    /// Alpha blending for both pipelines; replace otherwise.
    pub alpha_blend: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.15, 1.0],
            sprite_mode: SpriteMode::Auto,
            alpha_blend: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_config_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.sprite_mode, SpriteMode::Auto);
        assert!(config.alpha_blend);
        assert_eq!(config.clear_color[3], 1.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RenderConfig =
            serde_json::from_str(r#"{ "sprite_mode": "instanced" }"#).unwrap();
        assert_eq!(config.sprite_mode, SpriteMode::Instanced);
        assert_eq!(config.clear_color, RenderConfig::default().clear_color);
    }
}
