mod firing;
mod rig;
mod scenarios;
