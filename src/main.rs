//! Shapeview - pick a primitive or drop an OBJ file, switch material presets
//! and environments, and save 1920x1080 screenshots.

use shapeview::config::ViewerConfig;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = match ViewerConfig::load() {
        Ok(config) => config,
        Err(err) => {
            log::warn!("Ignoring unreadable config, using defaults: {}", err);
            ViewerConfig::default()
        }
    };

    if let Err(err) = shapeview::app::run(config) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
