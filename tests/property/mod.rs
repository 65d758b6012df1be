// Property tests for monoc.
//
//   promotion  - numeric kind joins
//   encoding   - assembler output decodes back to the same instruction stream
//   arithmetic - compiled integer operators against a reference model
//
// Run with more cases:
//   PROPTEST_CASES=1000 cargo test --test property

mod arithmetic;
mod encoding;
mod promotion;
