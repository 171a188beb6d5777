//! Bundled sample evaluation, used by the demo command and tests.
//!
//! Three iterations (2, 4 and 8 statements), winner Candidate B with a 3 to 5
//! vote. `staged_sample` replays the same document the way a live backend
//! fills it in.

use serde_json::{json, Value};

use crate::record::{Candidate, EvaluationRecord};

pub const SAMPLE_EVALUATION_ID: &str = "67c37dcde83f769118fe9276";

/// Ids starting with this prefix are served the sample by the in-memory client.
pub const DEMO_ID_PREFIX: &str = "eval-";

pub const SAMPLE_JOB_DESCRIPTION: &str =
    "Engineering lead for a product team: hands-on technical work plus people management";

const ITERATION_1: [&str; 2] = [
    "Candidate A demonstrates strong technical skills in their listed experience, which aligns well with the technical requirements of the position",
    "Candidate B exhibits superior leadership potential, with clear examples of team management and conflict resolution",
];

const ITERATION_2: [&str; 4] = [
    "Candidate A's technical expertise directly addresses the technical requirements, suggesting they could quickly adapt to the role",
    "While Candidate A shows strong technical skills, Candidate B's experience may offer a more diverse skill set for long-term growth in the position",
    "Candidate B's leadership examples align closely with the emphasis on team management, suggesting a better fit for the supervisory responsibilities",
    "While Candidate B shows strong leadership potential, Candidate A's technical record needs review so crucial qualifications are not overlooked",
];

const ITERATION_3: [&str; 8] = [
    "Candidate A's technical expertise aligns closely with the job requirements, allowing a shorter onboarding period",
    "While Candidate A excels in technical skills, Candidate B may have stronger soft skills for team collaboration and project management",
    "Candidate A's strong technical skills promise immediate productivity in the technical aspects of the role",
    "Candidate B's diverse experience suggests adaptability and a broader perspective on complex, multifaceted projects",
    "Candidate B's leadership examples show a track record of successful team management matching the supervisory duties",
    "While Candidate A may have strong technical skills, their experience lacks the depth of team leadership that Candidate B possesses",
    "Candidate A's technical skills and past performance should be weighed against the stated qualifications",
    "While Candidate B shows strong leadership potential, their leadership style must suit the needs of the team",
];

/// The complete, decided sample record.
pub fn sample_evaluation() -> EvaluationRecord {
    EvaluationRecord::new()
        .with_id(SAMPLE_EVALUATION_ID)
        .with_job_description(SAMPLE_JOB_DESCRIPTION)
        .with_iteration(0, ITERATION_1)
        .with_iteration(1, ITERATION_2)
        .with_iteration(2, ITERATION_3)
        .with_winner(Candidate::B)
        .with_votes(3, 5)
}

/// The sample as the backend stores it (MongoDB extended JSON).
pub fn sample_evaluation_json() -> Value {
    json!({
        "_id": { "$oid": SAMPLE_EVALUATION_ID },
        "job_description": SAMPLE_JOB_DESCRIPTION,
        "iteration_1": ITERATION_1,
        "iteration_2": ITERATION_2,
        "iteration_3": ITERATION_3,
        "final_winner": "Candidate B",
        "majority_vote": {
            "Candidate A": { "$numberInt": "3" },
            "Candidate B": { "$numberInt": "5" }
        }
    })
}

/// Successive versions of the sample: one more iteration per version, then
/// the decision.
pub fn staged_sample() -> Vec<EvaluationRecord> {
    let base = EvaluationRecord::new()
        .with_id(SAMPLE_EVALUATION_ID)
        .with_job_description(SAMPLE_JOB_DESCRIPTION);
    let first = base.clone().with_iteration(0, ITERATION_1);
    let second = first.clone().with_iteration(1, ITERATION_2);
    let third = second.clone().with_iteration(2, ITERATION_3);
    vec![first, second, third, sample_evaluation()]
}
