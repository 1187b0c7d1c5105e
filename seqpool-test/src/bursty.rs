//! A test-runner for flushing out data-races and race-conditions.

use std::{
    sync::{Arc, atomic::{AtomicBool, AtomicUsize, Ordering}},
    thread::{self, JoinHandle},
};

/// Bursty runs user-specified steps _in lock-step_ across multiple threads.
///
/// Each thread owns a Local state, and all threads share a Global state. Every step starts as simultaneously as
/// possible on all threads: no thread starts step S+1 before every thread has completed step S.
///
/// Constructing a `Bursty` is done through a `BurstyBuilder`.
pub struct Bursty<Global, Local> {
    global: Arc<Global>,
    threads: Vec<JoinHandle<Local>>,
}

impl<Global, Local> Bursty<Global, Local> {
    /// Returns a handle to the Global state, which outlives the threads.
    ///
    /// Access is provided _without_ joining the threads first.
    pub fn global(&self) -> Arc<Global> { self.global.clone() }

    /// Joins the threads, and returns their Local states, in the order they were supplied.
    ///
    /// #   Panics
    ///
    /// If any of the threads panicked.
    pub fn join(self) -> Vec<Local> {
        self.threads.into_iter()
            .map(|handle| handle.join().unwrap_or_else(|_| panic!("A Bursty thread panicked")))
            .collect()
    }
}

/// BurstyBuilder, a builder for a `Bursty` instance.
///
/// #   Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use seqpool_test::BurstyBuilder;
///
/// let mut builder = BurstyBuilder::new(AtomicUsize::new(0), vec![1, 10]);
///
/// builder.add_step(|| |global: &AtomicUsize, local: &mut usize| { global.fetch_add(*local, Ordering::Relaxed); });
///
/// let bursty = builder.launch(4);
/// let global = bursty.global();
/// let locals = bursty.join();
///
/// assert_eq!(vec![1, 10], locals);
/// assert_eq!(44, global.load(Ordering::Relaxed));
/// ```
pub struct BurstyBuilder<Global, Local> {
    global: Arc<Global>,
    locals: Vec<Local>,
    steps: Vec<Vec<Step<Global, Local>>>,
}

impl<Global, Local> BurstyBuilder<Global, Local>
    where
        Global: Send + Sync + 'static,
        Local: Send + 'static,
{
    /// Creates a new instance, with one thread per Local state.
    ///
    /// #   Panics
    ///
    /// If `locals` is empty.
    pub fn new(global: Global, locals: Vec<Local>) -> Self {
        assert!(!locals.is_empty(), "Cannot run a burst test without a single thread");

        let steps = locals.iter().map(|_| Vec::new()).collect();

        Self { global: Arc::new(global), locals, steps }
    }

    /// Adds a step on each thread.
    ///
    /// The step is created by invoking `factory` once for each thread.
    pub fn add_step<Factory, S>(&mut self, mut factory: Factory)
        where
            Factory: FnMut() -> S,
            S: FnMut(&Global, &mut Local) + Send + 'static,
    {
        for serie in &mut self.steps {
            serie.push(Box::new(factory()));
        }
    }

    /// Launches the threads, each running its serie of steps `iterations` times.
    ///
    /// #   Panics
    ///
    /// If no step was added.
    pub fn launch(self, iterations: usize) -> Bursty<Global, Local> {
        assert!(!self.steps[0].is_empty(), "Cannot run a burst test without a single step");

        let gate = Arc::new(Gate::new(self.locals.len()));
        let global = self.global;

        let threads = self.locals.into_iter().zip(self.steps.into_iter()).map(|(mut local, mut serie)| {
            let global = global.clone();
            let gate = gate.clone();

            thread::spawn(move || {
                let guard = PoisonGuard(&gate);

                for _ in 0..iterations {
                    for step in &mut serie {
                        gate.wait();

                        step(&global, &mut local);
                    }
                }

                guard.dismiss();

                local
            })
        }).collect();

        Bursty { global, threads }
    }
}

//
//  Implementation details
//

type Step<Global, Local> = Box<dyn FnMut(&Global, &mut Local) + Send + 'static>;

//  A reusable barrier, which can be poisoned to release the waiters of a failed run.
struct Gate {
    count: usize,
    waiting: AtomicUsize,
    generation: AtomicUsize,
    poisoned: AtomicBool,
}

impl Gate {
    fn new(count: usize) -> Self {
        Self { count, waiting: AtomicUsize::new(0), generation: AtomicUsize::new(0), poisoned: AtomicBool::new(false) }
    }

    fn wait(&self) {
        let generation = self.generation.load(Ordering::Acquire);

        if self.waiting.fetch_add(1, Ordering::AcqRel) + 1 == self.count {
            self.waiting.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Release);
            return;
        }

        while self.generation.load(Ordering::Acquire) == generation {
            if self.poisoned.load(Ordering::Relaxed) {
                abandon_ship();
            }

            thread::yield_now();
        }
    }
}

//  If a single thread panics, the others must not wait for it forever.
struct PoisonGuard<'a>(&'a Gate);

impl<'a> PoisonGuard<'a> {
    fn dismiss(self) { std::mem::forget(self); }
}

impl<'a> Drop for PoisonGuard<'a> {
    fn drop(&mut self) { self.0.poisoned.store(true, Ordering::Relaxed); }
}

#[cold]
#[inline(never)]
fn abandon_ship() -> ! {
    panic!("Someone poisoned the well!");
}

// mod tests
