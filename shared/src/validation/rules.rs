/// Values the `required` rule can check.
///
/// Mirrors zero-value semantics: empty strings and sequences, `None` and
/// numeric zero count as absent.
pub trait Requirable {
    fn is_present(&self) -> bool;
}

impl Requirable for str {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Requirable for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Requirable for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T> Requirable for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Requirable for [T] {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! impl_requirable_number {
    ($($ty:ty),*) => {
        $(
            impl Requirable for $ty {
                fn is_present(&self) -> bool {
                    *self != <$ty>::default()
                }
            }
        )*
    };
}

impl_requirable_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl Requirable for serde_json::Value {
    fn is_present(&self) -> bool {
        !self.is_null()
    }
}
