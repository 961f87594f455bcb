pub mod synochat_routes;
