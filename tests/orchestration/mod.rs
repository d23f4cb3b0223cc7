mod decisions;
mod failure_classification;
