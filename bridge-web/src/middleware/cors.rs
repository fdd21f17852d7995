use actix_cors::Cors;
use bridge_models::settings::Cors as CorsConfig;

pub(crate) fn middleware(cors_config: &CorsConfig) -> Cors {
    if !cors_config.enabled {
        return Cors::default();
    }

    if cors_config.origins.is_empty() {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600)
    } else {
        let origins = cors_config.origins.clone();
        Cors::default()
            .allowed_origin_fn(move |origin, _| {
                origin
                    .to_str()
                    .map(|o| origins.iter().any(|allowed| allowed == o))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allow_any_header()
            .max_age(3600)
    }
}
