mod deployment_flows;
mod persistence;
mod restarts;
