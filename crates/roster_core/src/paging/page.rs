use super::{PageRequest, Sort};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// One window of results plus the total number of matching rows.
#[derive(Debug, Clone)]
pub struct Page<T> {
    content: Vec<T>,
    number: u64,
    size: u64,
    total_elements: u64,
    sort: Sort,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
            sort: request.sort().clone(),
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Number of elements in this window.
    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    /// `ceil(total_elements / size)`.
    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(self.size)
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        self.number.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            sort: self.sort,
        }
    }
}

impl<T: Serialize> Serialize for Page<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Page", 9)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("number", &self.number)?;
        state.serialize_field("size", &self.size)?;
        state.serialize_field("numberOfElements", &self.content.len())?;
        state.serialize_field("totalElements", &self.total_elements)?;
        state.serialize_field("totalPages", &self.total_pages())?;
        state.serialize_field("first", &self.is_first())?;
        state.serialize_field("last", &self.is_last())?;
        state.serialize_field("sort", &self.sort)?;
        state.end()
    }
}

/// One window of results that only knows whether a following window exists.
#[derive(Debug, Clone)]
pub struct Slice<T> {
    content: Vec<T>,
    number: u64,
    size: u64,
    has_next: bool,
    sort: Sort,
}

impl<T> Slice<T> {
    /// Builds a slice from up to `size + 1` fetched rows, trimming the lookahead row.
    pub fn from_lookahead(mut fetched: Vec<T>, request: &PageRequest) -> Self {
        let size = usize::try_from(request.size()).unwrap_or(usize::MAX);
        let has_next = fetched.len() > size;
        fetched.truncate(size);
        Self {
            content: fetched,
            number: request.page(),
            size: request.size(),
            has_next,
            sort: request.sort().clone(),
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
            sort: self.sort,
        }
    }
}

impl<T: Serialize> Serialize for Slice<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Slice", 7)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("number", &self.number)?;
        state.serialize_field("size", &self.size)?;
        state.serialize_field("numberOfElements", &self.content.len())?;
        state.serialize_field("first", &self.is_first())?;
        state.serialize_field("last", &self.is_last())?;
        state.serialize_field("sort", &self.sort)?;
        state.end()
    }
}
