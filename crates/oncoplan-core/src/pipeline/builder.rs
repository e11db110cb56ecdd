use super::{PipelineError, StageError, Step};

/// A composed chain of steps. `STAGES` is the 1-based position of the last
/// step, used to attribute a failure to the step that raised it.
pub trait Runnable: Send + Sync {
    type Input: Send;
    type Output: Send;

    const STAGES: usize;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<Self::Output, StageError>> + Send;
}

fn at_stage<S: Step>(stage: usize, step: &S) -> impl FnOnce(PipelineError) -> StageError {
    let name = step.name();
    move |source| StageError {
        stage,
        step: name,
        source,
    }
}

pub struct Start<S>(S);

impl<S: Step> Runnable for Start<S> {
    type Input = S::Input;
    type Output = S::Output;

    const STAGES: usize = 1;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, StageError> {
        self.0.run(input).await.map_err(at_stage(1, &self.0))
    }
}

pub struct Chain<Prev, Current> {
    prev: Prev,
    current: Current,
}

impl<Prev, Current> Runnable for Chain<Prev, Current>
where
    Prev: Runnable,
    Current: Step<Input = Prev::Output>,
{
    type Input = Prev::Input;
    type Output = Current::Output;

    const STAGES: usize = Prev::STAGES + 1;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, StageError> {
        let intermediate = self.prev.run(input).await?;
        self.current
            .run(intermediate)
            .await
            .map_err(at_stage(Self::STAGES, &self.current))
    }
}

pub struct Pipeline<S> {
    steps: S,
}

impl Pipeline<()> {
    #[must_use]
    pub fn start<S: Step>(step: S) -> Pipeline<Start<S>> {
        Pipeline { steps: Start(step) }
    }
}

impl<S> Pipeline<S> {
    #[must_use]
    pub fn step<T: Step>(self, step: T) -> Pipeline<Chain<S, T>> {
        Pipeline {
            steps: Chain {
                prev: self.steps,
                current: step,
            },
        }
    }
}

impl<S: Runnable> Pipeline<S> {
    /// # Errors
    ///
    /// Returns the first failing step's error tagged with its position;
    /// later steps do not run.
    pub async fn run(&self, input: S::Input) -> Result<S::Output, StageError> {
        self.steps.run(input).await
    }
}
