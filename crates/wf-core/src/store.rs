use crate::ForgeError;
use crate::events::EventRepository;
use crate::jobs::JobRepository;

pub trait Store {
    type Jobs<'a>: JobRepository
    where
        Self: 'a;
    type Events<'a>: EventRepository
    where
        Self: 'a;

    fn jobs(&self) -> Self::Jobs<'_>;
    fn events(&self) -> Self::Events<'_>;

    fn with_tx<F, T>(&self, f: F) -> Result<T, ForgeError>
    where
        F: FnOnce(&Self) -> Result<T, ForgeError>;
}
