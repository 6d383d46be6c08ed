//! Loader 分层合并的集成测试

use kit_config::{AppConfig, Loader};

#[test]
fn file_values_override_defaults() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "kit.toml",
            r#"
                app_name = "billing"
                app_env = "production"

                [server]
                port = 6000
            "#,
        )?;
        let config: AppConfig = Loader::new("kit").with_file("kit.toml").load().unwrap();
        assert_eq!(config.app_name, "billing");
        assert_eq!(config.server.port, 6000);
        // 文件未提供的字段保持 serde 默认值
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.is_production());
        Ok(())
    });
}

#[test]
fn env_overrides_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "kit.toml",
            r#"
                [server]
                port = 6000
            "#,
        )?;
        jail.set_env("KIT_SERVER_PORT", "7000");
        let config: AppConfig = AppConfig::loader("kit")
            .with_file("kit.toml")
            .load()
            .unwrap();
        assert_eq!(config.server.port, 7000);
        Ok(())
    });
}

#[test]
fn explicit_override_beats_env() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("KIT_SERVER_PORT", "7000");
        let config: AppConfig = AppConfig::loader("kit")
            .override_with("server.port", 8000)
            .load()
            .unwrap();
        assert_eq!(config.server.port, 8000);
        Ok(())
    });
}

#[test]
fn last_override_wins() {
    figment::Jail::expect_with(|_jail| {
        let config: AppConfig = Loader::new("kit")
            .override_with("app_name", "first")
            .override_with("app_name", "second")
            .load()
            .unwrap();
        assert_eq!(config.app_name, "second");
        Ok(())
    });
}

#[test]
fn env_binds_underscored_top_level_field() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("KIT_APP_NAME", "fromenv");
        let config = AppConfig::load("kit").unwrap();
        assert_eq!(config.app_name, "fromenv");
        Ok(())
    });
}

#[test]
fn env_binds_underscored_field_inside_section() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("KIT_TELEMETRY_LOG_LEVEL", "debug");
        jail.set_env("KIT_DATABASE_MAX_CONNECTIONS", "42");
        jail.set_env("KIT_DATABASE_URL", "postgres://localhost/kit");
        let config = AppConfig::load("kit").unwrap();
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.database.unwrap().max_connections, 42);
        Ok(())
    });
}

#[test]
fn hyphenated_name_env_binding() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("NEWPROJECT_VERSION", "1.2.3");
        jail.set_env("NEWPROJECT_APP_NAME", "new-project");
        let config: AppConfig = Loader::new("new-project").load().unwrap();
        assert_eq!(config.version, "1.2.3");
        assert_eq!(config.app_name, "new-project");
        Ok(())
    });
}
