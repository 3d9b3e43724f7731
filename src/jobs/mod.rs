pub mod city_backfill;
pub mod mail_dispatcher;
