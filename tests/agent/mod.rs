mod from_config;
