//! A small genetic search over candidate genomes.
//!
//! The learner keeps a population sorted by fitness. Each generation keeps
//! the fitter half and refills the rest with mixtures of surviving parents.
//! All randomness lives in the caller's `Generator`, so a seeded generator
//! makes the whole search deterministic.

pub trait Generator {
    type Genome;

    fn make_random(&mut self) -> Self::Genome;
    fn make_mixture(&mut self, left: &Self::Genome, right: &Self::Genome) -> Self::Genome;
    fn fitness(&mut self, genome: &Self::Genome) -> f64;
}

pub struct GeneticLearner<G: Generator> {
    generator: G,
    population: Vec<(G::Genome, f64)>,
}

impl<G: Generator> GeneticLearner<G> {
    pub fn new(mut generator: G, size: usize) -> Self {
        assert!(size >= 2);
        let mut population = Vec::with_capacity(size);
        for _ in 0..size {
            let genome = generator.make_random();
            let fitness = generator.fitness(&genome);
            population.push((genome, fitness));
        }
        let mut learner = GeneticLearner {
            generator,
            population,
        };
        learner.sort();
        learner
    }

    pub fn best(&self) -> &G::Genome {
        &self.population[0].0
    }

    pub fn best_fitness(&self) -> f64 {
        self.population[0].1
    }

    pub fn run_generation(&mut self) {
        let size = self.population.len();
        let keep = (size + 1) / 2;
        for i in keep..size {
            let left = &self.population[(i - keep) % keep].0;
            let right = &self.population[(i - keep + 1) % keep].0;
            let child = self.generator.make_mixture(left, right);
            let fitness = self.generator.fitness(&child);
            self.population[i] = (child, fitness);
        }
        self.sort();
    }

    fn sort(&mut self) {
        // Stable: equal fitness keeps the earlier genome first.
        self.population
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maximizes the value of a single integer via averaging mixtures.
    struct Climb {
        next: i64,
    }

    impl Generator for Climb {
        type Genome = i64;
        fn make_random(&mut self) -> i64 {
            self.next += 7;
            self.next % 50
        }
        fn make_mixture(&mut self, left: &i64, right: &i64) -> i64 {
            (left + right) / 2 + 1
        }
        fn fitness(&mut self, genome: &i64) -> f64 {
            *genome as f64
        }
    }

    #[test]
    fn best_improves_monotonically() {
        let mut learner = GeneticLearner::new(Climb { next: 0 }, 6);
        let mut best = learner.best_fitness();
        for _ in 0..10 {
            learner.run_generation();
            assert!(learner.best_fitness() >= best);
            best = learner.best_fitness();
        }
    }
}
