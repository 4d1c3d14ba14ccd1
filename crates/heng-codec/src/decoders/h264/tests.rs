mod helpers;

mod dpb;
