pub mod city;
pub mod engagement;
pub mod identity;
pub mod report;
