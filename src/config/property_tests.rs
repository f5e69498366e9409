//! Property-based tests for configuration module
//!
//! These tests use proptest to generate random configurations and verify
//! validation bounds and serialization round-trips.

use super::*;
use proptest::prelude::*;

prop_compose! {
    fn valid_screen_config()(
        width in 1u32..=16384,
        height in 1u32..=16384,
        bits_per_pixel in prop_oneof![Just(8u32), Just(15), Just(16), Just(24), Just(32)],
    ) -> ScreenConfig {
        ScreenConfig { width, height, bits_per_pixel }
    }
}

prop_compose! {
    fn valid_workspace_config()(count in 1u32..=32)(
        count in Just(count),
        initial in 0..count,
        colors in prop::collection::vec("#[0-9A-Fa-f]{6}", 0..5),
    ) -> WorkspaceConfig {
        WorkspaceConfig { count, initial, colors }
    }
}

prop_compose! {
    fn valid_server_config()(
        batch_size in 1usize..500,
        direct_handoff_timeout_ms in 1u64..=10_000,
        max_windows_per_desktop in 1usize..4096,
        max_views_per_window in 1usize..65536,
        max_pictures in 0usize..4096,
    ) -> ServerConfig {
        ServerConfig {
            batch_size,
            direct_handoff_timeout_ms,
            max_windows_per_desktop,
            max_views_per_window,
            max_pictures,
        }
    }
}

prop_compose! {
    fn valid_decorator_config()(
        tab_height in 0u32..64,
        border_width in 0u32..32,
        focused_tab_color in "#[0-9A-Fa-f]{6}",
        unfocused_tab_color in "#[0-9A-Fa-f]{6}",
        border_color in "#[0-9A-Fa-f]{8}",
    ) -> DecoratorConfig {
        DecoratorConfig {
            tab_height,
            border_width,
            focused_tab_color,
            unfocused_tab_color,
            border_color,
        }
    }
}

prop_compose! {
    fn valid_config()(
        screen in valid_screen_config(),
        workspaces in valid_workspace_config(),
        server in valid_server_config(),
        decorator in valid_decorator_config(),
        debug in any::<bool>(),
    ) -> TesseraConfig {
        TesseraConfig {
            screen,
            workspaces,
            server,
            decorator,
            general: GeneralConfig { debug },
        }
    }
}

proptest! {
    #[test]
    fn prop_generated_configs_validate(config in valid_config()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_toml_roundtrip(config in valid_config()) {
        let text = toml::to_string(&config).unwrap();
        let back: TesseraConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(back, config);
    }

    #[test]
    fn prop_workspace_count_bounds(count in 0u32..100) {
        let mut config = TesseraConfig::default();
        config.workspaces.count = count;
        let result = config.validate();
        if (1..=32).contains(&count) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_workspace_color_lookup_never_panics(
        workspaces in valid_workspace_config(),
        index in 0usize..64,
    ) {
        let _ = workspaces.color(index);
    }

    #[test]
    fn prop_handoff_timeout_bounds(timeout in 0u64..20_000) {
        let mut config = TesseraConfig::default();
        config.server.direct_handoff_timeout_ms = timeout;
        let result = config.validate();
        if timeout >= 1 && timeout <= 10_000 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}
